//! Motion gate – the filter deciding whether a new camera pose is worth
//! integrating.
//!
//! A near-static camera produces many observations of the same surface patch;
//! fusing all of them accumulates correlated sensor noise into a biased
//! surface estimate instead of improving it.  The gate therefore drops any
//! frame whose translational displacement since the last *integrated* frame
//! falls below a threshold.
//!
//! The decision is stateless and deterministic: the caller supplies both
//! poses, the gate compares.

use voxfuse_perception::transform::Transform3D;

/// Default minimum camera translation (metres) between integrated frames.
pub const DEFAULT_MIN_TRANSLATION: f32 = 0.00001;

/// Translational displacement magnitude between two poses: the norm of the
/// translation of `current⁻¹ ∘ previous`.
pub fn displacement(current: &Transform3D, previous: &Transform3D) -> f32 {
    current.inverse().compose(*previous).translation.norm()
}

/// Pure decision function gating integration on camera motion.
#[derive(Debug, Clone, Copy)]
pub struct MotionGate {
    enabled: bool,
    threshold: f32,
}

impl MotionGate {
    /// A gate with the given minimum translation.  A disabled gate accepts
    /// every frame.
    pub fn new(enabled: bool, threshold: f32) -> Self {
        Self { enabled, threshold }
    }

    /// Should a frame observed at `current` be integrated, given that the
    /// last integrated frame was observed at `previous`?
    ///
    /// Accepts iff the displacement magnitude is **at least** the threshold.
    /// The comparison is done in squared form so a displacement exactly equal
    /// to the threshold is accepted without square-root rounding.
    pub fn should_integrate(&self, current: &Transform3D, previous: &Transform3D) -> bool {
        if !self.enabled {
            return true;
        }
        let displacement_sq = current
            .inverse()
            .compose(*previous)
            .translation
            .norm_squared();
        displacement_sq >= self.threshold * self.threshold
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for MotionGate {
    fn default() -> Self {
        Self::new(true, DEFAULT_MIN_TRANSLATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_perception::transform::{Quaternion, Vec3};

    fn pose_at(x: f32) -> Transform3D {
        Transform3D::new(Vec3::new(x, 0.0, 0.0), Quaternion::identity())
    }

    #[test]
    fn displacement_below_default_threshold_is_rejected() {
        let gate = MotionGate::default();
        // 0.000005 m < 0.00001 m
        assert!(!gate.should_integrate(&pose_at(0.000005), &Transform3D::identity()));
    }

    #[test]
    fn displacement_above_default_threshold_is_accepted() {
        let gate = MotionGate::default();
        // 0.00002 m > 0.00001 m
        assert!(gate.should_integrate(&pose_at(0.00002), &Transform3D::identity()));
    }

    #[test]
    fn displacement_exactly_at_threshold_is_accepted() {
        // The boundary convention: == threshold meets the threshold.
        let gate = MotionGate::new(true, 0.00001);
        assert!(gate.should_integrate(&pose_at(0.00001), &Transform3D::identity()));
    }

    #[test]
    fn zero_displacement_is_rejected() {
        let gate = MotionGate::default();
        let pose = pose_at(1.0);
        assert!(!gate.should_integrate(&pose, &pose));
    }

    #[test]
    fn disabled_gate_accepts_everything() {
        let gate = MotionGate::new(false, 1000.0);
        let pose = pose_at(1.0);
        assert!(gate.should_integrate(&pose, &pose));
    }

    #[test]
    fn gate_is_monotonic_in_threshold() {
        // For fixed poses, raising the threshold can only flip accept→reject,
        // lowering it only reject→accept.
        let current = pose_at(0.5);
        let previous = Transform3D::identity();
        let thresholds = [0.0, 0.1, 0.25, 0.5, 0.500001, 1.0, 2.0];

        let mut last_accept = true;
        for &t in &thresholds {
            let accept = MotionGate::new(true, t).should_integrate(&current, &previous);
            assert!(
                !accept || last_accept,
                "threshold {t} accepted after a lower threshold rejected"
            );
            last_accept = accept;
        }
    }

    #[test]
    fn displacement_is_symmetric_in_argument_order() {
        let a = pose_at(1.0);
        let b = pose_at(3.5);
        assert!((displacement(&a, &b) - displacement(&b, &a)).abs() < 1e-6);
        assert!((displacement(&a, &b) - 2.5).abs() < 1e-5);
    }
}
