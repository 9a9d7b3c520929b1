//! [`MeshExportService`] – on-demand mesh extraction and persistence.
//!
//! Runs on an independent cadence from the frame stream but shares the same
//! volume.  An export takes the exclusive volume lock just long enough to
//! copy out a consistent snapshot of the grid; extraction and serialization
//! then run on the copy, so a long meshing pass never stalls integration
//! beyond the snapshot.
//!
//! Failures in extraction or persistence are reported to the caller and do
//! not touch the volume or the pipeline's baseline pose.

use std::path::{Path, PathBuf};

use tracing::info;
use voxfuse_types::{FusionError, Mesh};

use crate::volume::{MeshWriter, SharedVolume, SurfaceExtractor, lock_volume};

/// Summary of a completed export, echoed back to the requester.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub vertices: usize,
    pub triangles: usize,
}

/// Snapshot → extract → persist, with exclusive volume access for the
/// snapshot only.
pub struct MeshExportService {
    volume: SharedVolume,
    extractor: Box<dyn SurfaceExtractor>,
    writer: Box<dyn MeshWriter>,
    /// Iso-surface scale handed to the extractor; set to the configured voxel
    /// resolution so mesh coordinates come out in metres.
    iso_scale: f32,
}

impl MeshExportService {
    pub fn new(
        volume: SharedVolume,
        extractor: Box<dyn SurfaceExtractor>,
        writer: Box<dyn MeshWriter>,
        voxel_resolution: f32,
    ) -> Self {
        Self {
            volume,
            extractor,
            writer,
            iso_scale: voxel_resolution,
        }
    }

    /// Extract the current surface and write it to `path`.
    ///
    /// Blocks until any in-flight fuse releases the volume lock, then works
    /// from a consistent full-grid copy.  Two calls with no intervening
    /// integration produce structurally identical meshes.
    pub fn export(&self, path: &Path) -> Result<ExportReport, FusionError> {
        info!(path = %path.display(), "starting mesh generation");

        // Exclusive access ends as soon as the snapshot is captured.
        let snapshot = {
            let volume = lock_volume(&self.volume);
            volume.snapshot()
        };

        let mesh: Mesh = self.extractor.extract(&snapshot, self.iso_scale)?;
        info!(
            vertices = mesh.vertices.len(),
            triangles = mesh.triangles.len(),
            "meshing done, saving"
        );

        self.writer.write(&mesh, path)?;
        info!(path = %path.display(), "mesh saved");

        Ok(ExportReport {
            path: path.to_path_buf(),
            vertices: mesh.vertices.len(),
            triangles: mesh.triangles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use voxfuse_perception::transform::Transform3D;
    use voxfuse_types::DepthMap;

    use crate::volume::{TsdfVolume, VolumeSnapshot, shared};

    /// Integrator stub whose snapshot reflects how many frames were fused.
    struct CountingVolume {
        fused: u16,
    }

    impl TsdfVolume for CountingVolume {
        fn fuse(&mut self, _d: &DepthMap, _p: &Transform3D) -> Result<(), FusionError> {
            self.fused += 1;
            Ok(())
        }

        fn snapshot(&self) -> VolumeSnapshot {
            VolumeSnapshot {
                dims: [2, 1, 1],
                voxel_resolution: 0.001,
                tsdf: vec![0.0, 1.0],
                weights: vec![self.fused, 0],
            }
        }
    }

    /// Extractor stub: one triangle whose x-coordinate encodes the fused
    /// count, so mesh identity tracks volume state.
    struct StubExtractor;

    impl SurfaceExtractor for StubExtractor {
        fn extract(&self, volume: &VolumeSnapshot, scale: f32) -> Result<Mesh, FusionError> {
            if volume.is_empty() {
                return Err(FusionError::MeshingFailure("volume is empty".into()));
            }
            let x = volume.weights[0] as f32 * scale;
            Ok(Mesh {
                vertices: vec![[x, 0.0, 0.0], [x, 1.0, 0.0], [x, 0.0, 1.0]],
                triangles: vec![[0, 1, 2]],
            })
        }
    }

    /// Writer stub recording every mesh it was asked to persist.
    #[derive(Clone, Default)]
    struct CapturingWriter {
        written: Arc<Mutex<Vec<Mesh>>>,
        fail: bool,
    }

    impl MeshWriter for CapturingWriter {
        fn write(&self, mesh: &Mesh, _path: &Path) -> Result<(), FusionError> {
            if self.fail {
                return Err(FusionError::PersistFailure("disk full".into()));
            }
            self.written.lock().unwrap().push(mesh.clone());
            Ok(())
        }
    }

    fn service_with(fused: u16, writer: CapturingWriter) -> MeshExportService {
        MeshExportService::new(
            shared(CountingVolume { fused }),
            Box::new(StubExtractor),
            Box::new(writer),
            0.001,
        )
    }

    #[test]
    fn back_to_back_exports_are_structurally_identical() {
        let writer = CapturingWriter::default();
        let service = service_with(3, writer.clone());

        service.export(Path::new("a.ply")).unwrap();
        service.export(Path::new("b.ply")).unwrap();

        let written = writer.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], written[1]);
    }

    #[test]
    fn export_reflects_volume_state_between_calls() {
        let writer = CapturingWriter::default();
        let volume = shared(CountingVolume { fused: 1 });
        let service = MeshExportService::new(
            volume.clone(),
            Box::new(StubExtractor),
            Box::new(writer.clone()),
            0.001,
        );

        service.export(Path::new("a.ply")).unwrap();
        lock_volume(&volume)
            .fuse(
                &DepthMap {
                    cols: 1,
                    rows: 1,
                    depths: vec![1],
                },
                &Transform3D::identity(),
            )
            .unwrap();
        service.export(Path::new("b.ply")).unwrap();

        let written = writer.written.lock().unwrap();
        assert_ne!(written[0], written[1]);
    }

    #[test]
    fn empty_volume_reports_meshing_failure() {
        let service = service_with(0, CapturingWriter::default());
        let err = service.export(Path::new("a.ply")).unwrap_err();
        assert!(matches!(err, FusionError::MeshingFailure(_)));
    }

    #[test]
    fn write_error_surfaces_as_persist_failure() {
        let writer = CapturingWriter {
            fail: true,
            ..CapturingWriter::default()
        };
        let service = service_with(2, writer);
        let err = service.export(Path::new("a.ply")).unwrap_err();
        assert!(matches!(err, FusionError::PersistFailure(_)));
    }

    #[test]
    fn report_carries_mesh_shape() {
        let report = service_with(2, CapturingWriter::default())
            .export(Path::new("out/cubes.ply"))
            .unwrap();
        assert_eq!(report.vertices, 3);
        assert_eq!(report.triangles, 1);
        assert_eq!(report.path, PathBuf::from("out/cubes.ply"));
    }
}
