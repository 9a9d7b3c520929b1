//! Collaborator traits at the pipeline's external seams.
//!
//! The volumetric integration algorithm, the surface-extraction algorithm and
//! the mesh serializer are opaque capabilities consumed through these traits;
//! `voxfuse-sim` provides in-process implementations for tests and the demo
//! stack, a GPU-backed integrator would plug in the same way.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use voxfuse_perception::transform::Transform3D;
use voxfuse_types::{DepthMap, FusionError, Mesh};

/// A consistent copy of the full voxel grid, taken under the volume lock.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSnapshot {
    /// Voxel grid dimensions (x, y, z).
    pub dims: [u32; 3],
    /// Edge length of one voxel, in metres.
    pub voxel_resolution: f32,
    /// Truncated signed distance per voxel, row-major (x fastest).
    pub tsdf: Vec<f32>,
    /// Accumulated observation weight per voxel.
    pub weights: Vec<u16>,
}

impl VolumeSnapshot {
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// A volume no depth data was ever fused into.
    pub fn is_empty(&self) -> bool {
        self.weights.iter().all(|&w| w == 0)
    }

    /// Linear index of voxel `(x, y, z)`.
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize * self.dims[1] as usize + y as usize) * self.dims[0] as usize + x as usize
    }
}

/// The volumetric integrator owning the mutable TSDF grid.
pub trait TsdfVolume: Send {
    /// Fuse one depth map observed from `camera_pose` (camera pose expressed
    /// in the volume frame) into the grid.
    ///
    /// # Errors
    ///
    /// [`FusionError::IntegrationFailure`] when the integrator rejects the
    /// frame, e.g. the observed geometry falls outside the volume bounds.
    /// A failed fuse must leave the grid unchanged.
    fn fuse(&mut self, depth: &DepthMap, camera_pose: &Transform3D) -> Result<(), FusionError>;

    /// Copy out the full grid state.
    fn snapshot(&self) -> VolumeSnapshot;
}

/// The surface-extraction algorithm (e.g. marching cubes).
pub trait SurfaceExtractor: Send {
    /// Extract the iso-surface of `volume` as a triangle mesh, with vertex
    /// coordinates scaled by `scale` (the pipeline passes the voxel
    /// resolution, mapping voxel indices to metres).
    ///
    /// # Errors
    ///
    /// [`FusionError::MeshingFailure`] for a degenerate or empty volume.
    fn extract(&self, volume: &VolumeSnapshot, scale: f32) -> Result<Mesh, FusionError>;
}

/// Mesh file serialization.
pub trait MeshWriter: Send {
    /// Persist `mesh` to `path`.
    ///
    /// # Errors
    ///
    /// [`FusionError::PersistFailure`] on any I/O error.
    fn write(&self, mesh: &Mesh, path: &Path) -> Result<(), FusionError>;
}

/// The exclusive-access handle to one volume, shared between the integration
/// path (writer) and the export path (full-grid reader).
///
/// The lock scope is one `fuse` call or one snapshot: whichever path holds it
/// blocks the other, which is the serialization discipline the volume
/// requires.
pub type SharedVolume = Arc<Mutex<Box<dyn TsdfVolume>>>;

/// Wrap an integrator into a [`SharedVolume`].
pub fn shared(volume: impl TsdfVolume + 'static) -> SharedVolume {
    Arc::new(Mutex::new(Box::new(volume)))
}

/// Acquire the volume lock, recovering the guard if a previous holder
/// panicked mid-operation.  Volume state after such a panic is undefined for
/// the rest of the run; the lock itself stays usable so export errors can
/// still be reported.
pub fn lock_volume(volume: &SharedVolume) -> MutexGuard<'_, Box<dyn TsdfVolume>> {
    volume.lock().unwrap_or_else(|e| e.into_inner())
}
