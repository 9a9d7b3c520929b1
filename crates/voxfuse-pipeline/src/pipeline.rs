//! [`FusionPipeline`] – the per-frame orchestrator.
//!
//! Owns the baseline pose and the exclusive handle to the volumetric
//! integrator.  [`FusionPipeline::on_frame`] is invoked once per inbound
//! depth frame, strictly in arrival order, and runs the four-step control
//! sequence: resolve pose → motion gate → convert → fuse.
//!
//! The single state-update invariant: the baseline pose advances **iff** all
//! four steps succeed.  A frame dropped at any step – pose timeout, too
//! little motion, bad encoding, integrator rejection – leaves the baseline
//! and the volume exactly as they were, so the next frame is still compared
//! against the last genuinely fused pose.  Dropped frames are not retried or
//! buffered: in a continuous stream, the next frame supersedes them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};
use voxfuse_perception::depth::FrameConverter;
use voxfuse_perception::transform::{TfResolver, Transform3D};
use voxfuse_types::{DepthFrame, FusionError, PixelEncoding, VolumeConfig};

use crate::gate::{self, MotionGate};
use crate::volume::{SharedVolume, lock_volume};

/// How long a single pose lookup may block.
pub const POSE_TIMEOUT: Duration = Duration::from_secs(1);

/// What happened to one inbound frame.
///
/// Only [`FrameOutcome::Integrated`] mutates any state.  The drop variants
/// are all recoverable per-frame conditions: logged, frame discarded, stream
/// continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was fused and the baseline pose advanced.
    Integrated,
    /// Transform lookup failed or timed out.
    PoseUnavailable,
    /// Camera moved less than the gate threshold; expected filtering, not an
    /// error.
    BelowMotionThreshold,
    /// The raw buffer failed encoding validation.
    DecodeFailed,
    /// The integrator rejected the frame; baseline not advanced.
    IntegrationFailed,
}

/// Running per-stream counters, surfaced by the CLI `/status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub integrated: u64,
    pub dropped: u64,
}

/// Shared atomic backing for [`PipelineStats`], so an operator surface can
/// read the counters while the pipeline task owns the pipeline itself.
#[derive(Debug, Default)]
pub struct StatsCounters {
    integrated: AtomicU64,
    dropped: AtomicU64,
}

impl StatsCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            integrated: self.integrated.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// The frame-integration orchestrator.  Single writer of the baseline pose
/// and sole integration-path user of the shared volume.
pub struct FusionPipeline {
    config: VolumeConfig,
    resolver: TfResolver,
    converter: FrameConverter,
    gate: MotionGate,
    volume: SharedVolume,
    /// Pose of the most recently successfully integrated frame.  Starts at
    /// identity.
    baseline: Transform3D,
    pose_timeout: Duration,
    stats: Arc<StatsCounters>,
}

impl FusionPipeline {
    /// Build the pipeline.  Fails with [`FusionError::InvalidConfig`] – the
    /// one fatal error class – before any frame is accepted.
    pub fn new(
        config: VolumeConfig,
        resolver: TfResolver,
        volume: SharedVolume,
    ) -> Result<Self, FusionError> {
        config.validate()?;
        let gate = MotionGate::new(config.motion_gate_enabled, config.min_translation);
        Ok(Self {
            config,
            resolver,
            converter: FrameConverter::new(PixelEncoding::Mono16),
            gate,
            volume,
            baseline: Transform3D::identity(),
            pose_timeout: POSE_TIMEOUT,
            stats: Arc::new(StatsCounters::default()),
        })
    }

    /// Override the pose-lookup timeout (tests use a short one).
    pub fn with_pose_timeout(mut self, timeout: Duration) -> Self {
        self.pose_timeout = timeout;
        self
    }

    /// Pose of the last successfully integrated frame.
    pub fn baseline(&self) -> Transform3D {
        self.baseline
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.snapshot()
    }

    /// Clonable handle to the live counters, for reading from another task.
    pub fn stats_handle(&self) -> Arc<StatsCounters> {
        self.stats.clone()
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Process one inbound depth frame.
    ///
    /// All failures are handled locally: logged, counted, frame dropped,
    /// state untouched.  Nothing propagates an error that could halt the
    /// stream.
    pub async fn on_frame(&mut self, frame: DepthFrame) -> FrameOutcome {
        debug!(frame_id = %frame.frame_id, stamp = %frame.stamp, "got depth frame");

        // 1. Camera pose in the volume frame at the capture time.
        let pose = match self
            .resolver
            .resolve(
                &self.config.volume_frame,
                &frame.frame_id,
                frame.stamp,
                self.pose_timeout,
            )
            .await
        {
            Ok(pose) => pose,
            Err(e) => {
                warn!(error = %e, "dropping frame: pose unavailable");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return FrameOutcome::PoseUnavailable;
            }
        };

        // 2. Motion gate against the last integrated pose.
        if !self.gate.should_integrate(&pose, &self.baseline) {
            debug!(
                displacement = gate::displacement(&pose, &self.baseline),
                threshold = self.gate.threshold(),
                "dropping frame: camera motion below threshold"
            );
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::BelowMotionThreshold;
        }

        // 3. Validate and decode the raw buffer.
        let depth = match self.converter.convert(&frame) {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "dropping frame: decode failed");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return FrameOutcome::DecodeFailed;
            }
        };

        // 4. Fuse under the exclusive volume lock.
        let fused = {
            let mut volume = lock_volume(&self.volume);
            volume.fuse(&depth, &pose)
        };
        if let Err(e) = fused {
            warn!(error = %e, "failed to fuse frame");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::IntegrationFailed;
        }

        // 5. Only now does the baseline advance.
        self.baseline = pose;
        let integrated = self.stats.integrated.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(integrated, "frame fused into volume");
        FrameOutcome::Integrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Utc};
    use voxfuse_perception::transform::{Quaternion, Vec3};
    use voxfuse_types::DepthMap;

    use crate::volume::{TsdfVolume, VolumeSnapshot, shared};

    // ── Recording stub integrator ──────────────────────────────────────────

    #[derive(Default)]
    struct RecState {
        fused_poses: Vec<Transform3D>,
        fail_next: bool,
    }

    #[derive(Clone, Default)]
    struct RecordingVolume {
        state: Arc<Mutex<RecState>>,
    }

    impl TsdfVolume for RecordingVolume {
        fn fuse(&mut self, _depth: &DepthMap, pose: &Transform3D) -> Result<(), FusionError> {
            let mut st = self.state.lock().unwrap();
            if st.fail_next {
                st.fail_next = false;
                return Err(FusionError::IntegrationFailure(
                    "pose outside volume bounds".into(),
                ));
            }
            st.fused_poses.push(*pose);
            Ok(())
        }

        fn snapshot(&self) -> VolumeSnapshot {
            VolumeSnapshot {
                dims: [1, 1, 1],
                voxel_resolution: 0.001,
                tsdf: vec![1.0],
                weights: vec![self.state.lock().unwrap().fused_poses.len() as u16],
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn stamp(ms: i64) -> DateTime<Utc> {
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        t0 + chrono::Duration::milliseconds(ms)
    }

    fn frame_at(ms: i64) -> DepthFrame {
        DepthFrame {
            data: vec![0u8; 2 * 2 * 2],
            encoding: PixelEncoding::Mono16,
            cols: 2,
            rows: 2,
            stamp: stamp(ms),
            frame_id: "camera".to_string(),
        }
    }

    fn pose_at(x: f32) -> Transform3D {
        Transform3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity())
    }

    fn small_config() -> VolumeConfig {
        VolumeConfig {
            volume_dims: [16, 16, 16],
            voxel_resolution: 0.01,
            cols: 2,
            rows: 2,
            ..VolumeConfig::default()
        }
    }

    fn build(
        config: VolumeConfig,
    ) -> (FusionPipeline, TfResolver, RecordingVolume) {
        let resolver = TfResolver::new();
        let rec = RecordingVolume::default();
        let pipeline = FusionPipeline::new(config, resolver.clone(), shared(rec.clone()))
            .unwrap()
            .with_pose_timeout(Duration::from_millis(30));
        (pipeline, resolver, rec)
    }

    fn broadcast(resolver: &TfResolver, ms: i64, pose: Transform3D) {
        resolver.insert("tsdf_origin", "camera", stamp(ms), pose);
    }

    // ── Tests ──────────────────────────────────────────────────────────────

    #[test]
    fn invalid_config_aborts_construction() {
        let resolver = TfResolver::new();
        let cfg = VolumeConfig {
            volume_dims: [0, 16, 16],
            ..small_config()
        };
        let err = FusionPipeline::new(cfg, resolver, shared(RecordingVolume::default()))
            .err()
            .expect("zero dims must be fatal");
        assert!(matches!(err, FusionError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn successful_frame_advances_baseline() {
        let (mut pipeline, resolver, rec) = build(small_config());
        broadcast(&resolver, 0, pose_at(0.05));

        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::Integrated);
        assert_eq!(pipeline.baseline(), pose_at(0.05));
        assert_eq!(rec.state.lock().unwrap().fused_poses, vec![pose_at(0.05)]);
    }

    #[tokio::test]
    async fn pose_timeout_leaves_all_state_unchanged() {
        let (mut pipeline, resolver, rec) = build(small_config());
        // No broadcast at all: the lookup must time out within the budget.

        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::PoseUnavailable);
        assert_eq!(pipeline.baseline(), Transform3D::identity());
        assert!(rec.state.lock().unwrap().fused_poses.is_empty());

        // The very next frame is processed as if the failed one never
        // arrived.
        broadcast(&resolver, 100, pose_at(0.05));
        let outcome = pipeline.on_frame(frame_at(100)).await;
        assert_eq!(outcome, FrameOutcome::Integrated);
        assert_eq!(pipeline.baseline(), pose_at(0.05));
    }

    #[tokio::test]
    async fn sub_threshold_motion_is_dropped_without_state_change() {
        let (mut pipeline, resolver, rec) = build(small_config());
        // Baseline starts at identity; 0.000005 m < default 0.00001 m.
        broadcast(&resolver, 0, pose_at(0.000005));

        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::BelowMotionThreshold);
        assert_eq!(pipeline.baseline(), Transform3D::identity());
        assert!(rec.state.lock().unwrap().fused_poses.is_empty());
    }

    #[tokio::test]
    async fn super_threshold_motion_is_integrated() {
        let (mut pipeline, resolver, _rec) = build(small_config());
        // 0.00002 m > 0.00001 m.
        broadcast(&resolver, 0, pose_at(0.00002));

        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::Integrated);
        assert_eq!(pipeline.baseline(), pose_at(0.00002));
    }

    #[tokio::test]
    async fn decode_failure_drops_frame_before_fusing() {
        let (mut pipeline, resolver, rec) = build(small_config());
        broadcast(&resolver, 0, pose_at(0.05));

        let mut frame = frame_at(0);
        frame.encoding = PixelEncoding::Rgb8;

        let outcome = pipeline.on_frame(frame).await;
        assert_eq!(outcome, FrameOutcome::DecodeFailed);
        assert_eq!(pipeline.baseline(), Transform3D::identity());
        assert!(rec.state.lock().unwrap().fused_poses.is_empty());
    }

    #[tokio::test]
    async fn integrator_failure_does_not_advance_baseline() {
        let (mut pipeline, resolver, rec) = build(small_config());
        broadcast(&resolver, 0, pose_at(0.05));
        broadcast(&resolver, 100, pose_at(0.10));
        rec.state.lock().unwrap().fail_next = true;

        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::IntegrationFailed);
        assert_eq!(pipeline.baseline(), Transform3D::identity());

        // The next frame is still gated against the last *fused* pose
        // (identity), not the rejected 0.05 pose.
        let outcome = pipeline.on_frame(frame_at(100)).await;
        assert_eq!(outcome, FrameOutcome::Integrated);
        assert_eq!(pipeline.baseline(), pose_at(0.10));
        assert_eq!(rec.state.lock().unwrap().fused_poses, vec![pose_at(0.10)]);
    }

    #[tokio::test]
    async fn baseline_always_equals_last_integrated_pose() {
        // Mixed sequence: successes, a gate drop, an integrator failure.
        let (mut pipeline, resolver, rec) = build(small_config());
        broadcast(&resolver, 0, pose_at(0.01));
        broadcast(&resolver, 10, pose_at(0.010000005)); // ~5e-9 from previous
        broadcast(&resolver, 20, pose_at(0.03));
        broadcast(&resolver, 30, pose_at(0.06));

        assert_eq!(pipeline.on_frame(frame_at(0)).await, FrameOutcome::Integrated);
        assert_eq!(
            pipeline.on_frame(frame_at(10)).await,
            FrameOutcome::BelowMotionThreshold
        );
        rec.state.lock().unwrap().fail_next = true;
        assert_eq!(
            pipeline.on_frame(frame_at(20)).await,
            FrameOutcome::IntegrationFailed
        );
        assert_eq!(pipeline.on_frame(frame_at(30)).await, FrameOutcome::Integrated);

        assert_eq!(pipeline.baseline(), pose_at(0.06));
        assert_eq!(
            rec.state.lock().unwrap().fused_poses,
            vec![pose_at(0.01), pose_at(0.06)]
        );
        assert_eq!(
            pipeline.stats(),
            PipelineStats {
                integrated: 2,
                dropped: 2
            }
        );
    }

    #[tokio::test]
    async fn disabled_gate_fuses_static_camera() {
        let cfg = VolumeConfig {
            motion_gate_enabled: false,
            ..small_config()
        };
        let (mut pipeline, resolver, _rec) = build(cfg);
        broadcast(&resolver, 0, Transform3D::identity());

        // Zero displacement from the identity baseline, but the gate is off.
        let outcome = pipeline.on_frame(frame_at(0)).await;
        assert_eq!(outcome, FrameOutcome::Integrated);
    }
}
