use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel encodings a depth source may claim for its raw buffer.
///
/// The fusion pipeline accepts exactly one of these ([`PixelEncoding::Mono16`])
/// and rejects everything else rather than reinterpreting the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelEncoding {
    /// 16-bit unsigned depth samples, little-endian, one channel.
    Mono16,
    /// 8-bit single-channel intensity.
    Mono8,
    /// 8-bit three-channel colour.
    Rgb8,
}

impl std::fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelEncoding::Mono16 => write!(f, "mono16"),
            PixelEncoding::Mono8 => write!(f, "mono8"),
            PixelEncoding::Rgb8 => write!(f, "rgb8"),
        }
    }
}

/// A raw depth image as it arrives from the sensor stream.
///
/// Immutable value: the pipeline consumes each frame exactly once and never
/// mutates the buffer. `stamp` is the capture time embedded by the sensor,
/// not the arrival time; pose lookups use it so that transport latency does
/// not translate into pose error.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    /// Raw pixel buffer in `encoding` layout.
    pub data: Vec<u8>,
    /// Claimed encoding of `data`.
    pub encoding: PixelEncoding,
    /// Image width in pixels.
    pub cols: u32,
    /// Image height in pixels.
    pub rows: u32,
    /// Capture timestamp assigned by the sensor.
    pub stamp: DateTime<Utc>,
    /// Coordinate frame the camera reported the image in, e.g. `"camera"`.
    pub frame_id: String,
}

/// A validated, decoded depth image: one `u16` sample per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    pub cols: u32,
    pub rows: u32,
    pub depths: Vec<u16>,
}

impl DepthMap {
    /// Depth sample at `(col, row)`, or `None` when out of bounds.
    pub fn at(&self, col: u32, row: u32) -> Option<u16> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.depths.get((row * self.cols + col) as usize).copied()
    }
}

/// An indexed triangle mesh produced by surface extraction.
///
/// A mesh has no persistent identity: every export recomputes it from the
/// volume's current state, so two exports over an unchanged volume are
/// structurally identical.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }
}

/// Pinhole camera intrinsics of the depth sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

/// TSDF volume and pipeline parameters, read once at startup and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Voxel grid dimensions (x, y, z), all positive.
    #[serde(default = "default_volume_dims")]
    pub volume_dims: [u32; 3],
    /// Edge length of one voxel, in metres.
    #[serde(default = "default_voxel_resolution")]
    pub voxel_resolution: f32,
    /// Maximum accumulated observation weight per voxel.
    #[serde(default = "default_max_weight")]
    pub max_weight: u16,
    /// Raycast step size as a fraction of voxel size.
    #[serde(default = "default_step_factor")]
    pub raycast_step_factor: f32,
    /// Gradient sampling delta as a fraction of voxel size.
    #[serde(default = "default_step_factor")]
    pub gradient_delta_factor: f32,
    /// Depth camera intrinsics.
    #[serde(default = "default_intrinsics")]
    pub intrinsics: CameraIntrinsics,
    /// Expected depth image width in pixels.
    #[serde(default = "default_cols")]
    pub cols: u32,
    /// Expected depth image height in pixels.
    #[serde(default = "default_rows")]
    pub rows: u32,
    /// Name of the frame anchored at the volume origin.
    #[serde(default = "default_volume_frame")]
    pub volume_frame: String,
    /// Whether the motion gate filters near-static frames.
    #[serde(default = "default_true")]
    pub motion_gate_enabled: bool,
    /// Minimum camera translation (metres) since the last integrated frame
    /// for a new frame to be fused.
    #[serde(default = "default_min_translation")]
    pub min_translation: f32,
}

fn default_volume_dims() -> [u32; 3] {
    [640, 640, 192]
}
fn default_voxel_resolution() -> f32 {
    0.001
}
fn default_max_weight() -> u16 {
    50
}
fn default_step_factor() -> f32 {
    0.25
}
fn default_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: 550.0,
        fy: 550.0,
        cx: 320.0,
        cy: 240.0,
    }
}
fn default_cols() -> u32 {
    640
}
fn default_rows() -> u32 {
    480
}
fn default_volume_frame() -> String {
    "tsdf_origin".to_string()
}
fn default_true() -> bool {
    true
}
fn default_min_translation() -> f32 {
    0.00001
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            volume_dims: default_volume_dims(),
            voxel_resolution: default_voxel_resolution(),
            max_weight: default_max_weight(),
            raycast_step_factor: default_step_factor(),
            gradient_delta_factor: default_step_factor(),
            intrinsics: default_intrinsics(),
            cols: default_cols(),
            rows: default_rows(),
            volume_frame: default_volume_frame(),
            motion_gate_enabled: default_true(),
            min_translation: default_min_translation(),
        }
    }
}

impl VolumeConfig {
    /// Truncation band of the signed distance field, fixed at five voxels.
    pub fn truncation_distance(&self) -> f32 {
        5.0 * self.voxel_resolution
    }

    /// Physical extent of the volume along each axis, in metres.
    pub fn volume_extent(&self) -> [f32; 3] {
        [
            self.volume_dims[0] as f32 * self.voxel_resolution,
            self.volume_dims[1] as f32 * self.voxel_resolution,
            self.volume_dims[2] as f32 * self.voxel_resolution,
        ]
    }

    /// Reject a configuration the pipeline cannot safely start with.
    ///
    /// This is the only fatal error class in the system: it must abort
    /// initialisation before the frame stream begins.
    pub fn validate(&self) -> Result<(), FusionError> {
        if self.volume_dims.iter().any(|&d| d == 0) {
            return Err(FusionError::InvalidConfig(format!(
                "volume_dims must all be positive, got {:?}",
                self.volume_dims
            )));
        }
        if !(self.voxel_resolution > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "voxel_resolution must be positive, got {}",
                self.voxel_resolution
            )));
        }
        if self.cols == 0 || self.rows == 0 {
            return Err(FusionError::InvalidConfig(format!(
                "image dimensions must be positive, got {}x{}",
                self.cols, self.rows
            )));
        }
        if !(self.intrinsics.fx > 0.0) || !(self.intrinsics.fy > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.intrinsics.fx, self.intrinsics.fy
            )));
        }
        if !(self.min_translation >= 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "min_translation must be non-negative, got {}",
                self.min_translation
            )));
        }
        Ok(())
    }
}

/// Error taxonomy of the fusion system.
///
/// Everything except [`FusionError::InvalidConfig`] is recoverable: per-frame
/// errors drop the frame and the stream continues; export errors are reported
/// to the requesting caller and leave the volume untouched.
#[derive(Error, Debug)]
pub enum FusionError {
    /// Transform lookup failed or timed out; the frame is dropped.
    #[error("pose unavailable: {0}")]
    PoseUnavailable(String),

    /// The raw image claimed an encoding the pipeline does not accept.
    #[error("unsupported encoding: expected {expected}, got {actual}")]
    UnsupportedEncoding {
        expected: PixelEncoding,
        actual: PixelEncoding,
    },

    /// The raw buffer does not match the claimed image geometry.
    #[error("corrupt depth buffer: expected {expected} bytes, got {actual}")]
    CorruptBuffer { expected: usize, actual: usize },

    /// The volumetric integrator rejected the frame.
    #[error("integration failed: {0}")]
    IntegrationFailure(String),

    /// Surface extraction could not produce a mesh (e.g. empty volume).
    #[error("meshing failed: {0}")]
    MeshingFailure(String),

    /// The extracted mesh could not be written to disk.
    #[error("mesh persistence failed: {0}")]
    PersistFailure(String),

    /// Malformed startup configuration. Fatal: abort before streaming.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_distance_is_five_voxels() {
        let cfg = VolumeConfig {
            volume_dims: [640, 640, 192],
            voxel_resolution: 0.001,
            ..VolumeConfig::default()
        };
        assert!((cfg.truncation_distance() - 0.005).abs() < 1e-9);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(VolumeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_volume_dimension_is_fatal() {
        let cfg = VolumeConfig {
            volume_dims: [640, 0, 192],
            ..VolumeConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(FusionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_positive_resolution_is_fatal() {
        let cfg = VolumeConfig {
            voxel_resolution: 0.0,
            ..VolumeConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = VolumeConfig {
            voxel_resolution: -0.001,
            ..VolumeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_image_dims_are_fatal() {
        let cfg = VolumeConfig {
            cols: 0,
            ..VolumeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_toml_roundtrip_with_defaults() {
        // A sparse TOML file relies on the serde defaults for everything else.
        let cfg: VolumeConfig = toml::from_str(
            r#"
            volume_dims = [64, 64, 64]
            voxel_resolution = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(cfg.volume_dims, [64, 64, 64]);
        assert_eq!(cfg.max_weight, 50);
        assert_eq!(cfg.volume_frame, "tsdf_origin");
        assert!((cfg.truncation_distance() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn pixel_encoding_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PixelEncoding::Mono16).unwrap(),
            "\"mono16\""
        );
        let e: PixelEncoding = serde_json::from_str("\"rgb8\"").unwrap();
        assert_eq!(e, PixelEncoding::Rgb8);
    }

    #[test]
    fn depth_map_indexing() {
        let map = DepthMap {
            cols: 3,
            rows: 2,
            depths: vec![10, 20, 30, 40, 50, 60],
        };
        assert_eq!(map.at(0, 0), Some(10));
        assert_eq!(map.at(2, 1), Some(60));
        assert_eq!(map.at(3, 0), None);
        assert_eq!(map.at(0, 2), None);
    }

    #[test]
    fn fusion_error_display() {
        let err = FusionError::UnsupportedEncoding {
            expected: PixelEncoding::Mono16,
            actual: PixelEncoding::Rgb8,
        };
        assert!(err.to_string().contains("mono16"));
        assert!(err.to_string().contains("rgb8"));

        let err = FusionError::PoseUnavailable("lookup timed out".into());
        assert!(err.to_string().contains("pose unavailable"));
    }
}
