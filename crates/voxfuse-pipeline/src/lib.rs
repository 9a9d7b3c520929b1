//! `voxfuse-pipeline` – the frame-integration control pipeline.
//!
//! Orchestrates the path from an inbound depth frame to a mutated TSDF
//! volume, and the on-demand path from an export request to a mesh on disk:
//!
//! 1. **Resolve** – look up the camera pose in the volume frame at the
//!    frame's capture time, bounded by a timeout.
//! 2. **Gate** – drop the frame when the camera barely moved since the last
//!    integrated frame.
//! 3. **Convert** – validate and decode the fixed-encoding depth buffer.
//! 4. **Fuse** – hand (depth map, pose) to the volumetric integrator under
//!    the exclusive volume lock; only a successful fuse advances the
//!    baseline pose.
//!
//! # Modules
//!
//! - [`gate`] – [`MotionGate`][gate::MotionGate]: pure displacement filter.
//! - [`volume`] – collaborator traits ([`TsdfVolume`][volume::TsdfVolume],
//!   [`SurfaceExtractor`][volume::SurfaceExtractor],
//!   [`MeshWriter`][volume::MeshWriter]) and the shared volume handle.
//! - [`pipeline`] – [`FusionPipeline`][pipeline::FusionPipeline]: the
//!   per-frame orchestrator and owner of the baseline pose.
//! - [`export`] – [`MeshExportService`][export::MeshExportService]:
//!   snapshot, extract, persist.
//! - [`node`] – [`FusionNode`][node::FusionNode]: the owned dispatch loop
//!   serializing frames and export requests onto one volume.
//! - [`telemetry`] – tracing / OTLP initialisation.

pub mod export;
pub mod gate;
pub mod node;
pub mod pipeline;
pub mod telemetry;
pub mod volume;
