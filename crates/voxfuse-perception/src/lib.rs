//! `voxfuse-perception` – spatial groundwork for the fusion pipeline.
//!
//! Turns the two raw sensor inputs of the system into the validated forms the
//! pipeline consumes: stamped transforms into interpolated camera poses, and
//! raw image buffers into decoded depth maps.
//!
//! # Modules
//!
//! - [`transform`] – [`TfBuffer`][transform::TfBuffer]: time-indexed graph of
//!   named reference frames, and [`TfResolver`][transform::TfResolver]: its
//!   bounded-wait async front end.
//! - [`depth`] – [`FrameConverter`][depth::FrameConverter]: strict
//!   fixed-encoding depth image validation and decoding.

pub mod depth;
pub mod transform;
