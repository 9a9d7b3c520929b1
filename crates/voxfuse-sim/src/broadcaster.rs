//! Transform broadcaster for the simulated rig.
//!
//! A camera orbits the volume while a fixed offset relates the world frame to
//! the volume origin.  Both edges are re-broadcast every tick so lookups at
//! fresh capture stamps always find bracketing samples.

use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;
use voxfuse_perception::transform::{Quaternion, TfResolver, Transform3D, Vec3};

/// Publishes `world → camera` (orbiting) and `world → volume` (static)
/// transforms into a [`TfResolver`] at a fixed rate.
pub struct OrbitPoseBroadcaster {
    resolver: TfResolver,
    world_frame: String,
    camera_frame: String,
    volume_frame: String,
    /// Fixed offset from the world origin to the volume origin.
    world_to_volume: Vec3,
    /// Orbit radius around the volume centre, metres.
    radius: f32,
    /// Angular velocity of the orbit, rad/s.
    orbit_speed: f32,
    /// Broadcast rate, Hz.
    rate_hz: f64,
}

impl OrbitPoseBroadcaster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: TfResolver,
        world_frame: impl Into<String>,
        camera_frame: impl Into<String>,
        volume_frame: impl Into<String>,
        world_to_volume: Vec3,
        radius: f32,
        orbit_speed: f32,
        rate_hz: f64,
    ) -> Self {
        Self {
            resolver,
            world_frame: world_frame.into(),
            camera_frame: camera_frame.into(),
            volume_frame: volume_frame.into(),
            world_to_volume,
            radius,
            orbit_speed,
            rate_hz,
        }
    }

    /// Camera pose in the world frame at orbit angle `angle` (radians).
    ///
    /// The camera sits on a circle of `radius` in the XY plane and yaws to
    /// face the world origin.
    fn camera_pose(&self, angle: f32) -> Transform3D {
        let position = Vec3::new(self.radius * angle.cos(), self.radius * angle.sin(), 0.0);
        // Yaw by angle + π so the optical axis points back at the origin.
        let half = (angle + PI) * 0.5;
        let yaw = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        Transform3D::new(position, yaw)
    }

    /// Insert both edges at `stamp` for orbit angle `angle`.
    pub fn broadcast_at(&self, angle: f32, stamp: DateTime<Utc>) {
        self.resolver.insert(
            &self.world_frame,
            &self.camera_frame,
            stamp,
            self.camera_pose(angle),
        );
        self.resolver.insert(
            &self.world_frame,
            &self.volume_frame,
            stamp,
            Transform3D::new(self.world_to_volume, Quaternion::identity()),
        );
    }

    /// Broadcast until `shutdown` flips.
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        info!(
            camera = %self.camera_frame,
            volume = %self.volume_frame,
            rate_hz = self.rate_hz,
            "orbit broadcaster started"
        );
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / self.rate_hz));
        let started = Utc::now();
        while !shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            let now = Utc::now();
            let elapsed = (now - started)
                .num_microseconds()
                .unwrap_or(i64::MAX) as f32
                / 1.0e6;
            self.broadcast_at(self.orbit_speed * elapsed, now);
        }
        info!("orbit broadcaster stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster(resolver: TfResolver) -> OrbitPoseBroadcaster {
        OrbitPoseBroadcaster::new(
            resolver,
            "world",
            "camera",
            "tsdf_origin",
            Vec3::new(-0.3, -0.3, -0.01),
            1.0,
            1.0,
            30.0,
        )
    }

    #[test]
    fn camera_stays_on_orbit_radius() {
        let b = broadcaster(TfResolver::new());
        for i in 0..8 {
            let pose = b.camera_pose(i as f32 * PI / 4.0);
            assert!((pose.translation.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn camera_faces_the_origin() {
        let b = broadcaster(TfResolver::new());
        let pose = b.camera_pose(0.0);
        // At angle 0 the camera sits at (1, 0, 0) yawed by π: its local +X
        // axis points along world −X, toward the origin.
        let fwd = pose.rotation.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!((fwd.x + 1.0).abs() < 1e-5);
        assert!(fwd.y.abs() < 1e-4);
    }

    #[test]
    fn broadcast_makes_volume_to_camera_resolvable() {
        let resolver = TfResolver::new();
        let b = broadcaster(resolver.clone());
        let stamp = Utc::now();
        b.broadcast_at(0.0, stamp);

        let t = resolver.lookup_at("tsdf_origin", "camera", stamp).unwrap();
        // Camera at world (1, 0, 0); volume origin at world (−0.3, −0.3,
        // −0.01); camera in volume frame is the difference.
        assert!((t.translation.x - 1.3).abs() < 1e-5);
        assert!((t.translation.y - 0.3).abs() < 1e-5);
        assert!((t.translation.z - 0.01).abs() < 1e-5);
    }
}
