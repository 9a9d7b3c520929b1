//! Recording stand-ins for the volumetric integrator and surface extractor.
//!
//! [`SimVolume`] is not a real TSDF implementation – the production
//! integrator is an external capability – but it keeps a genuine voxel grid,
//! enforces the volume bounds, and caps observation weights, which is enough
//! to drive every pipeline path including the integration-failure one.

use tracing::debug;
use voxfuse_perception::transform::{Transform3D, Vec3};
use voxfuse_pipeline::volume::{SurfaceExtractor, TsdfVolume, VolumeSnapshot};
use voxfuse_types::{DepthMap, FusionError, Mesh, VolumeConfig};

/// Depth unit of inbound Mono16 samples: millimetres per count.
const DEPTH_UNIT_M: f32 = 0.001;

/// A recording volumetric integrator over a real (small) voxel grid.
///
/// Each fused frame marks the voxel at the centre of the camera's view –
/// camera position plus mean observed depth along the optical axis – and
/// accumulates observation weight there, capped at the configured maximum.
/// A view landing outside the grid rejects the frame and leaves the grid
/// unchanged.
pub struct SimVolume {
    dims: [u32; 3],
    voxel_resolution: f32,
    max_weight: u16,
    tsdf: Vec<f32>,
    weights: Vec<u16>,
}

impl SimVolume {
    pub fn new(config: &VolumeConfig) -> Self {
        let count = config.volume_dims.iter().map(|&d| d as usize).product();
        Self {
            dims: config.volume_dims,
            voxel_resolution: config.voxel_resolution,
            max_weight: config.max_weight,
            // Unobserved space starts at the positive truncation bound.
            tsdf: vec![1.0; count],
            weights: vec![0; count],
        }
    }

    /// Voxel index of a point expressed in the volume frame, or `None` when
    /// it falls outside the grid.
    fn voxel_of(&self, p: Vec3) -> Option<[u32; 3]> {
        let to_index = |coord: f32, dim: u32| -> Option<u32> {
            let idx = (coord / self.voxel_resolution).floor();
            if idx < 0.0 || idx >= dim as f32 {
                None
            } else {
                Some(idx as u32)
            }
        };
        Some([
            to_index(p.x, self.dims[0])?,
            to_index(p.y, self.dims[1])?,
            to_index(p.z, self.dims[2])?,
        ])
    }

    fn linear(&self, v: [u32; 3]) -> usize {
        (v[2] as usize * self.dims[1] as usize + v[1] as usize) * self.dims[0] as usize
            + v[0] as usize
    }
}

impl TsdfVolume for SimVolume {
    fn fuse(&mut self, depth: &DepthMap, camera_pose: &Transform3D) -> Result<(), FusionError> {
        let valid: Vec<u16> = depth.depths.iter().copied().filter(|&d| d > 0).collect();
        if valid.is_empty() {
            return Err(FusionError::IntegrationFailure(
                "depth image contains no valid samples".into(),
            ));
        }
        let mean_depth_m =
            valid.iter().map(|&d| d as f32).sum::<f32>() / valid.len() as f32 * DEPTH_UNIT_M;

        // Centre of the observed surface patch: mean depth along the camera's
        // local +X (optical) axis, expressed in the volume frame.
        let observed = camera_pose.translation.add(
            camera_pose
                .rotation
                .rotate(Vec3::new(mean_depth_m, 0.0, 0.0)),
        );

        let Some(voxel) = self.voxel_of(observed) else {
            return Err(FusionError::IntegrationFailure(format!(
                "observed point ({:.3}, {:.3}, {:.3}) outside volume bounds",
                observed.x, observed.y, observed.z
            )));
        };

        let idx = self.linear(voxel);
        self.tsdf[idx] = 0.0;
        self.weights[idx] = self.weights[idx].saturating_add(1).min(self.max_weight);
        debug!(?voxel, weight = self.weights[idx], "fused frame into sim volume");
        Ok(())
    }

    fn snapshot(&self) -> VolumeSnapshot {
        VolumeSnapshot {
            dims: self.dims,
            voxel_resolution: self.voxel_resolution,
            tsdf: self.tsdf.clone(),
            weights: self.weights.clone(),
        }
    }
}

/// Stand-in surface extractor: the axis-aligned bounding box of all observed
/// voxels, scaled into metric space.
///
/// Deterministic over a snapshot, so repeated exports of an unchanged volume
/// produce identical meshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxExtractor;

impl SurfaceExtractor for BoundingBoxExtractor {
    fn extract(&self, volume: &VolumeSnapshot, scale: f32) -> Result<Mesh, FusionError> {
        if volume.is_empty() {
            return Err(FusionError::MeshingFailure(
                "volume contains no observations".into(),
            ));
        }

        let mut min = [u32::MAX; 3];
        let mut max = [0u32; 3];
        for z in 0..volume.dims[2] {
            for y in 0..volume.dims[1] {
                for x in 0..volume.dims[0] {
                    if volume.weights[volume.index(x, y, z)] == 0 {
                        continue;
                    }
                    for (i, &c) in [x, y, z].iter().enumerate() {
                        min[i] = min[i].min(c);
                        max[i] = max[i].max(c);
                    }
                }
            }
        }

        let lo = [
            min[0] as f32 * scale,
            min[1] as f32 * scale,
            min[2] as f32 * scale,
        ];
        let hi = [
            (max[0] + 1) as f32 * scale,
            (max[1] + 1) as f32 * scale,
            (max[2] + 1) as f32 * scale,
        ];

        let vertices = vec![
            [lo[0], lo[1], lo[2]],
            [hi[0], lo[1], lo[2]],
            [hi[0], hi[1], lo[2]],
            [lo[0], hi[1], lo[2]],
            [lo[0], lo[1], hi[2]],
            [hi[0], lo[1], hi[2]],
            [hi[0], hi[1], hi[2]],
            [lo[0], hi[1], hi[2]],
        ];
        // Two triangles per face, outward winding.
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];

        Ok(Mesh {
            vertices,
            triangles,
        })
    }
}
