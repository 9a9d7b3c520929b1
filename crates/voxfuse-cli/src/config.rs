//! Configuration vault – reads `~/.voxfuse/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use voxfuse_types::VolumeConfig;

/// Settings for the simulated rig the demo mode runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSettings {
    /// Name of the fixed world frame.
    #[serde(default = "default_world_frame")]
    pub world_frame: String,
    /// Frame id the simulated camera stamps its images with.
    #[serde(default = "default_camera_frame")]
    pub camera_frame: String,
    /// Depth frame rate, Hz.
    #[serde(default = "default_framerate")]
    pub framerate_hz: f64,
    /// Transform broadcast rate, Hz.
    #[serde(default = "default_broadcast_rate")]
    pub broadcast_rate_hz: f64,
    /// Orbit angular velocity, rad/s.
    #[serde(default = "default_orbit_speed")]
    pub orbit_speed: f32,
    /// Orbit radius around the volume, metres.
    #[serde(default = "default_orbit_radius")]
    pub orbit_radius: f32,
    /// Fixed world → volume-origin offset, metres.
    #[serde(default = "default_world_to_volume")]
    pub world_to_volume: [f32; 3],
    /// Base distance of the simulated surface, millimetres.
    #[serde(default = "default_base_depth")]
    pub base_depth_mm: u16,
}

fn default_world_frame() -> String {
    "world".to_string()
}
fn default_camera_frame() -> String {
    "camera".to_string()
}
fn default_framerate() -> f64 {
    30.0
}
fn default_broadcast_rate() -> f64 {
    60.0
}
fn default_orbit_speed() -> f32 {
    1.0
}
fn default_orbit_radius() -> f32 {
    0.25
}
fn default_world_to_volume() -> [f32; 3] {
    [-0.3, -0.3, -0.01]
}
fn default_base_depth() -> u16 {
    400
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            world_frame: default_world_frame(),
            camera_frame: default_camera_frame(),
            framerate_hz: default_framerate(),
            broadcast_rate_hz: default_broadcast_rate(),
            orbit_speed: default_orbit_speed(),
            orbit_radius: default_orbit_radius(),
            world_to_volume: default_world_to_volume(),
            base_depth_mm: default_base_depth(),
        }
    }
}

/// Persisted configuration stored in `~/.voxfuse/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// TSDF volume and pipeline parameters.
    #[serde(default)]
    pub volume: VolumeConfig,
    /// Simulated rig parameters.
    #[serde(default)]
    pub sim: SimSettings,
    /// Where `/export` writes the mesh when no path is given.
    #[serde(default = "default_mesh_path")]
    pub mesh_output_path: PathBuf,
}

fn default_mesh_path() -> PathBuf {
    PathBuf::from("cubes.ply")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume: VolumeConfig::default(),
            sim: SimSettings::default(),
            mesh_output_path: default_mesh_path(),
        }
    }
}

/// Return the path to `~/.voxfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".voxfuse").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_under_home() {
        let path = config_path_for_home("/home/operator");
        assert_eq!(
            path,
            PathBuf::from("/home/operator/.voxfuse/config.toml")
        );
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        assert_eq!(load_from(&path).unwrap(), None);
    }

    #[test]
    fn sparse_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            mesh_output_path = "scan.ply"

            [volume]
            volume_dims = [64, 64, 32]
            voxel_resolution = 0.005
            "#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().expect("config present");
        assert_eq!(cfg.mesh_output_path, PathBuf::from("scan.ply"));
        assert_eq!(cfg.volume.volume_dims, [64, 64, 32]);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.volume.max_weight, 50);
        assert_eq!(cfg.sim.camera_frame, "camera");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "volume = 3").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn invalid_volume_section_fails_validation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            [volume]
            volume_dims = [0, 64, 32]
            "#,
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().expect("config present");
        assert!(cfg.volume.validate().is_err());
    }
}
