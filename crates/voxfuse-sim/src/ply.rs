//! Binary PLY mesh serialization.
//!
//! Writes the `binary_little_endian 1.0` flavour: an ASCII header followed by
//! packed 32-bit float vertices and `uchar`-counted `uint` triangle indices.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use voxfuse_pipeline::volume::MeshWriter;
use voxfuse_types::{FusionError, Mesh};

/// [`MeshWriter`] producing binary little-endian PLY files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyWriter;

impl PlyWriter {
    fn write_inner(mesh: &Mesh, path: &Path) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);

        write!(
            out,
            "ply\n\
             format binary_little_endian 1.0\n\
             element vertex {}\n\
             property float x\n\
             property float y\n\
             property float z\n\
             element face {}\n\
             property list uchar uint vertex_indices\n\
             end_header\n",
            mesh.vertices.len(),
            mesh.triangles.len()
        )?;

        for v in &mesh.vertices {
            for &c in v {
                out.write_all(&c.to_le_bytes())?;
            }
        }
        for t in &mesh.triangles {
            out.write_all(&[3u8])?;
            for &i in t {
                out.write_all(&i.to_le_bytes())?;
            }
        }
        out.flush()
    }
}

impl MeshWriter for PlyWriter {
    fn write(&self, mesh: &Mesh, path: &Path) -> Result<(), FusionError> {
        Self::write_inner(mesh, path).map_err(|e| {
            FusionError::PersistFailure(format!("writing {}: {e}", path.display()))
        })
    }
}
