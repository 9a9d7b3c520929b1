//! [`FusionNode`] – the owned dispatch loop.
//!
//! Two independent triggers act on one volume: the high-frequency depth
//! stream and the rare operator export request.  Rather than relying on an
//! external framework's incidental threading model, both are funnelled
//! through explicit channels into a single task, which gives the two
//! guarantees the volume requires for free:
//!
//! - frames are applied strictly in arrival order (one mpsc, one consumer);
//! - an export never races an in-flight fuse (both run on this task, and the
//!   volume lock covers any future out-of-task user).
//!
//! The export request carries a oneshot reply channel, so the trigger is
//! synchronous from the caller's perspective: the response arrives only after
//! meshing and persistence finish.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;
use voxfuse_types::DepthFrame;

use crate::export::MeshExportService;
use crate::pipeline::{FusionPipeline, PipelineStats};

/// An on-demand mesh-export trigger.
#[derive(Debug)]
pub struct ExportRequest {
    /// Where to write the mesh; `None` uses the node's configured path.
    pub output_path: Option<PathBuf>,
    /// Answered once meshing and persistence have finished (or failed).
    pub reply: oneshot::Sender<ExportResponse>,
}

/// Trigger-style response to an [`ExportRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub success: bool,
    pub message: String,
}

/// Sending half of the node's channels, handed to frame sources and the
/// operator surface.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    pub frames: mpsc::Sender<DepthFrame>,
    pub exports: mpsc::Sender<ExportRequest>,
}

/// The dispatch loop tying [`FusionPipeline`] and [`MeshExportService`]
/// together over one volume.
pub struct FusionNode {
    pipeline: FusionPipeline,
    export: MeshExportService,
    default_mesh_path: PathBuf,
}

impl FusionNode {
    pub fn new(
        pipeline: FusionPipeline,
        export: MeshExportService,
        default_mesh_path: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            export,
            default_mesh_path,
        }
    }

    /// Create the node's inbound channels.  `depth` of the frame channel
    /// bounds how many frames may queue while one is being fused; a full
    /// channel applies backpressure to the source.
    pub fn channels(
        depth: usize,
    ) -> (
        NodeHandle,
        mpsc::Receiver<DepthFrame>,
        mpsc::Receiver<ExportRequest>,
    ) {
        let (frame_tx, frame_rx) = mpsc::channel(depth);
        let (export_tx, export_rx) = mpsc::channel(4);
        (
            NodeHandle {
                frames: frame_tx,
                exports: export_tx,
            },
            frame_rx,
            export_rx,
        )
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Run until both inbound channels are closed.
    ///
    /// Frames and export requests are processed one at a time on this task;
    /// a request arriving mid-stream is serviced between frames.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<DepthFrame>,
        mut exports: mpsc::Receiver<ExportRequest>,
    ) {
        info!("fusion node started");
        let mut frames_open = true;
        let mut exports_open = true;

        while frames_open || exports_open {
            tokio::select! {
                frame = frames.recv(), if frames_open => match frame {
                    Some(frame) => {
                        self.pipeline.on_frame(frame).await;
                    }
                    None => frames_open = false,
                },
                request = exports.recv(), if exports_open => match request {
                    Some(request) => self.handle_export(request),
                    None => exports_open = false,
                },
            }
        }

        let stats = self.pipeline.stats();
        info!(
            integrated = stats.integrated,
            dropped = stats.dropped,
            "fusion node shutting down"
        );
    }

    fn handle_export(&mut self, request: ExportRequest) {
        let request_id = Uuid::new_v4();
        let path = request
            .output_path
            .unwrap_or_else(|| self.default_mesh_path.clone());
        info!(%request_id, path = %path.display(), "export requested");

        let response = match self.export.export(&path) {
            Ok(report) => ExportResponse {
                success: true,
                message: format!(
                    "mesh written to {} ({} vertices, {} triangles)",
                    report.path.display(),
                    report.vertices,
                    report.triangles
                ),
            },
            Err(e) => {
                warn!(%request_id, error = %e, "export failed");
                ExportResponse {
                    success: false,
                    message: e.to_string(),
                }
            }
        };

        if request.reply.send(response).is_err() {
            warn!(%request_id, "export requester vanished before the reply");
        }
    }
}
