//! `voxfuse-cli` – the voxfuse depth-fusion daemon and operator shell.
//!
//! This binary wires the whole stack together:
//!
//! 1. Loads `~/.voxfuse/config.toml` (defaults when absent) and validates the
//!    volume parameters – a malformed configuration aborts before any frame
//!    is accepted.
//! 2. Starts the simulated rig: an orbiting transform broadcaster and a
//!    synthetic depth camera feeding the fusion node.
//! 3. Drops the operator into a REPL (`/export`, `/status`, `/quit`).
//! 4. Intercepts **Ctrl-C** to stop the sources, drain the node and exit.

mod config;
mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use tracing::{error, info, warn};

use voxfuse_perception::transform::{TfResolver, Vec3};
use voxfuse_pipeline::export::MeshExportService;
use voxfuse_pipeline::node::FusionNode;
use voxfuse_pipeline::pipeline::FusionPipeline;
use voxfuse_pipeline::telemetry;
use voxfuse_pipeline::volume::shared;
use voxfuse_sim::broadcaster::OrbitPoseBroadcaster;
use voxfuse_sim::camera::{DepthSource, SimDepthCamera};
use voxfuse_sim::ply::PlyWriter;
use voxfuse_sim::volume::{BoundingBoxExtractor, SimVolume};

fn main() {
    // Hold the guard for the whole process so pending spans flush on exit.
    let _telemetry_guard = telemetry::init_tracing("voxfuse");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults.",
                config::config_path().display().to_string().dimmed()
            );
            config::Config::default()
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(1);
        }
    };

    // The one fatal error class: a volume the pipeline cannot start with.
    if let Err(e) = cfg.volume.validate() {
        error!(error = %e, "refusing to start");
        eprintln!("{}: {}", "Fatal".red().bold(), e);
        std::process::exit(1);
    }

    // ── Shutdown flag + Ctrl-C ────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Fatal".red().bold(), e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cfg, shutdown)) {
        eprintln!("{}: {}", "Fatal".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cfg: config::Config, shutdown: Arc<AtomicBool>) -> Result<(), String> {
    let resolver = TfResolver::new();
    let volume = shared(SimVolume::new(&cfg.volume));

    let pipeline = FusionPipeline::new(cfg.volume.clone(), resolver.clone(), volume.clone())
        .map_err(|e| e.to_string())?;
    let stats = pipeline.stats_handle();
    let export = MeshExportService::new(
        volume,
        Box::new(BoundingBoxExtractor),
        Box::new(PlyWriter),
        cfg.volume.voxel_resolution,
    );
    let node = FusionNode::new(pipeline, export, cfg.mesh_output_path.clone());
    let (handle, frame_rx, export_rx) = FusionNode::channels(32);

    // ── Simulated rig ─────────────────────────────────────────────────────
    let offset = cfg.sim.world_to_volume;
    let broadcaster = OrbitPoseBroadcaster::new(
        resolver,
        cfg.sim.world_frame.clone(),
        cfg.sim.camera_frame.clone(),
        cfg.volume.volume_frame.clone(),
        Vec3::new(offset[0], offset[1], offset[2]),
        cfg.sim.orbit_radius,
        cfg.sim.orbit_speed,
        cfg.sim.broadcast_rate_hz,
    );
    tokio::spawn(broadcaster.run(shutdown.clone()));

    let mut camera = SimDepthCamera::new(
        cfg.sim.camera_frame.clone(),
        cfg.volume.cols,
        cfg.volume.rows,
        cfg.sim.base_depth_mm,
    );
    let frame_tx = handle.frames.clone();
    let framerate = cfg.sim.framerate_hz;
    let camera_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / framerate));
        while !camera_shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            let frame = camera.capture(chrono::Utc::now());
            if frame_tx.send(frame).await.is_err() {
                break;
            }
        }
        info!("depth camera stopped");
    });

    let node_task = tokio::spawn(node.run(frame_rx, export_rx));

    println!(
        "  Fusing {}×{}×{} voxels @ {} m — type {} for commands.\n",
        cfg.volume.volume_dims[0],
        cfg.volume.volume_dims[1],
        cfg.volume.volume_dims[2],
        cfg.volume.voxel_resolution,
        "/help".bold()
    );

    // ── Operator REPL on a blocking thread ────────────────────────────────
    let ctx = repl::ReplContext {
        handle: handle.clone(),
        stats,
        volume: cfg.volume.clone(),
        default_mesh_path: cfg.mesh_output_path.clone(),
    };
    let repl_shutdown = shutdown.clone();
    let repl_task = tokio::task::spawn_blocking(move || repl::run(ctx, repl_shutdown));
    repl_task.await.map_err(|e| e.to_string())?;

    // Dropping the last senders closes the node's channels; the sources stop
    // on the shutdown flag.
    shutdown.store(true, Ordering::SeqCst);
    drop(handle);
    node_task.await.map_err(|e| e.to_string())?;
    info!("voxfuse stopped");
    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "  voxfuse — TSDF depth fusion".bold().cyan());
    println!("{}", "  ───────────────────────────".dimmed());
}
