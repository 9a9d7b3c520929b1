//! REPL – the operator surface of the fusion stack.
//!
//! Supported slash-commands:
//!   /help           – show this list
//!   /export [path]  – mesh the current volume and save it (default path
//!                     from config)
//!   /status         – show stream counters and volume parameters
//!   /quit | /exit   – shut the stack down

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use voxfuse_pipeline::node::{ExportRequest, NodeHandle};
use voxfuse_pipeline::pipeline::StatsCounters;
use voxfuse_types::VolumeConfig;

/// Everything the REPL needs from the rest of the stack.
pub struct ReplContext {
    pub handle: NodeHandle,
    pub stats: Arc<StatsCounters>,
    pub volume: VolumeConfig,
    pub default_mesh_path: PathBuf,
}

/// Entry point for the interactive REPL.  Runs on a plain blocking thread;
/// channel sends use the blocking variants.
///
/// `shutdown` is polled each iteration; when set (e.g. by the Ctrl-C
/// handler) the REPL exits cleanly.
pub fn run(ctx: ReplContext, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "voxfuse>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        match cmd.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["/help"] => cmd_help(),
            ["/export"] => cmd_export(&ctx, None),
            ["/export", path] => cmd_export(&ctx, Some(PathBuf::from(path))),
            ["/status"] => cmd_status(&ctx),
            ["/quit"] | ["/exit"] => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            _ => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    cmd.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "voxfuse Commands".bold().underline());
    println!(
        "  {}  – mesh the volume and save it (optional output path)",
        "/export [path]".bold().cyan()
    );
    println!(
        "  {}         – stream counters and volume parameters",
        "/status".bold().cyan()
    );
    println!(
        "  {}     – exit and shut the stack down",
        "/quit  /exit".bold().cyan()
    );
    println!();
}

/// Trigger a mesh export and wait for the result.  The call is synchronous:
/// the response only arrives after meshing and persistence finish.
fn cmd_export(ctx: &ReplContext, path: Option<PathBuf>) {
    let shown = path
        .clone()
        .unwrap_or_else(|| ctx.default_mesh_path.clone());
    println!("  Meshing volume → {} …", shown.display().to_string().bold());

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = ExportRequest {
        output_path: path,
        reply: reply_tx,
    };
    if ctx.handle.exports.blocking_send(request).is_err() {
        println!("{}", "  ✗ fusion node is no longer running".red());
        return;
    }

    match reply_rx.blocking_recv() {
        Ok(response) if response.success => {
            println!("  {} {}", "✓".green(), response.message);
        }
        Ok(response) => {
            println!("  {} {}", "✗".red(), response.message);
        }
        Err(_) => {
            println!("{}", "  ✗ fusion node dropped the request".red());
        }
    }
}

fn cmd_status(ctx: &ReplContext) {
    let stats = ctx.stats.snapshot();
    let dims = ctx.volume.volume_dims;
    println!();
    println!("{}", "Stream".bold().underline());
    println!("  frames integrated : {}", stats.integrated.to_string().bold());
    println!("  frames dropped    : {}", stats.dropped.to_string().bold());
    println!("{}", "Volume".bold().underline());
    println!("  grid              : {}×{}×{} voxels", dims[0], dims[1], dims[2]);
    println!("  resolution        : {} m/voxel", ctx.volume.voxel_resolution);
    println!(
        "  truncation        : {} m",
        ctx.volume.truncation_distance()
    );
    println!("  base frame        : {}", ctx.volume.volume_frame.bold());
    println!();
}
