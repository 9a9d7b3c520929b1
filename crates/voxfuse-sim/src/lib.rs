//! `voxfuse-sim` – in-process simulation stack for running the fusion
//! pipeline without a physical depth camera or robot.
//!
//! Provides stub implementations of every external collaborator the pipeline
//! consumes, so the full stack runs in headless tests, CI and the demo mode
//! of the CLI:
//!
//! - [`camera`] – [`SimDepthCamera`][camera::SimDepthCamera]: synthetic
//!   Mono16 depth frames at a configurable rate.
//! - [`broadcaster`] – [`OrbitPoseBroadcaster`][broadcaster::OrbitPoseBroadcaster]:
//!   publishes transforms for a camera orbiting the volume.
//! - [`volume`] – [`SimVolume`][volume::SimVolume] and
//!   [`BoundingBoxExtractor`][volume::BoundingBoxExtractor]: recording
//!   integrator and a deterministic stand-in surface extractor.
//! - [`ply`] – [`PlyWriter`][ply::PlyWriter]: binary PLY mesh serialization.

pub mod broadcaster;
pub mod camera;
pub mod ply;
pub mod volume;
