//! Simulated depth camera.

use chrono::{DateTime, Utc};
use voxfuse_types::{DepthFrame, PixelEncoding};

/// A depth-image source.
///
/// The only production implementation lives outside this workspace (a real
/// sensor driver); [`SimDepthCamera`] stands in for it in tests and the demo
/// stack.
pub trait DepthSource: Send {
    /// Stable identifier, used as the frame's coordinate-frame id.
    fn frame_id(&self) -> &str;

    /// Capture the next frame, stamped with the given capture time.
    fn capture(&mut self, stamp: DateTime<Utc>) -> DepthFrame;
}

/// Deterministic synthetic depth camera: a flat surface with a shallow ripple,
/// so consecutive frames carry plausible but reproducible depth data.
pub struct SimDepthCamera {
    frame_id: String,
    cols: u32,
    rows: u32,
    /// Base surface distance in depth units (millimetres).
    base_depth_mm: u16,
    seq: u32,
}

impl SimDepthCamera {
    pub fn new(frame_id: impl Into<String>, cols: u32, rows: u32, base_depth_mm: u16) -> Self {
        Self {
            frame_id: frame_id.into(),
            cols,
            rows,
            base_depth_mm,
            seq: 0,
        }
    }
}

impl DepthSource for SimDepthCamera {
    fn frame_id(&self) -> &str {
        &self.frame_id
    }

    fn capture(&mut self, stamp: DateTime<Utc>) -> DepthFrame {
        let mut data = Vec::with_capacity(self.cols as usize * self.rows as usize * 2);
        for row in 0..self.rows {
            for col in 0..self.cols {
                // Shallow ripple on top of the base plane, phase-shifted per
                // frame so the scene is not perfectly static.
                let phase = (col + row + self.seq) % 16;
                let depth = self.base_depth_mm.saturating_add(phase as u16);
                data.extend_from_slice(&depth.to_le_bytes());
            }
        }
        self.seq = self.seq.wrapping_add(1);
        DepthFrame {
            data,
            encoding: PixelEncoding::Mono16,
            cols: self.cols,
            rows: self.rows,
            stamp,
            frame_id: self.frame_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_geometry_matches_configuration() {
        let mut cam = SimDepthCamera::new("camera", 8, 4, 500);
        let frame = cam.capture(Utc::now());
        assert_eq!(frame.cols, 8);
        assert_eq!(frame.rows, 4);
        assert_eq!(frame.data.len(), 8 * 4 * 2);
        assert_eq!(frame.encoding, PixelEncoding::Mono16);
        assert_eq!(frame.frame_id, "camera");
    }

    #[test]
    fn depth_samples_stay_near_base_plane() {
        let mut cam = SimDepthCamera::new("camera", 4, 4, 500);
        let frame = cam.capture(Utc::now());
        for chunk in frame.data.chunks_exact(2) {
            let depth = u16::from_le_bytes([chunk[0], chunk[1]]);
            assert!((500..516).contains(&depth));
        }
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut cam = SimDepthCamera::new("camera", 4, 4, 500);
        let a = cam.capture(Utc::now());
        let b = cam.capture(Utc::now());
        assert_ne!(a.data, b.data);
    }
}
