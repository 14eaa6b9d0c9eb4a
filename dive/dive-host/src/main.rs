//! dive-host: the host-side entry point that drives a capture end to end —
//! connect to the on-device server (C5), trigger and download a capture
//! (C2/C4 via C5), resolve its sibling component files (C8), and report the
//! GPU timing stats that came down with it (C10).
//!
//! This binary is the only place in the workspace that owns a CLI argument
//! parser or a process-wide logging subscriber; every other crate is a
//! library consumed by it (or, for `dive-layer`, loaded by the Vulkan
//! loader instead).

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dive_capture::component_paths;
use dive_client::Client;
use dive_context::Context;
use dive_proto::Result;
use dive_timing::{AvailableTimingTable, ObjectType};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dive-host")]
#[command(about = "Trigger, download, and inspect Dive GPU captures")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to an on-device dive-server, trigger a capture, and download
    /// it alongside its sibling component files.
    Capture {
        /// Host to connect to, typically `127.0.0.1` behind an `adb forward`.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// TCP port the on-device server is forwarded to.
        #[arg(long)]
        port: u16,

        /// Directory to download the capture and its siblings into.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Parse an available-timing CSV already on disk and print its stats.
    Report {
        /// Path to a GPU-timing CSV produced by a previous capture.
        csv: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Capture { host, port, out_dir } => run_capture(&host, port, &out_dir),
        Command::Report { csv } => run_report(&csv),
    }
}

fn run_capture(host: &str, port: u16, out_dir: &Path) -> Result<()> {
    let ctx = Context::background();
    let client = Client::new();
    tracing::info!(host, port, "connecting to dive-server");
    client.connect(host, port)?;

    tracing::info!("triggering PM4 capture");
    let remote_path = client.start_pm4_capture()?;
    tracing::info!(%remote_path, "capture finalized on device");

    let remote_path_buf = PathBuf::from(&remote_path);
    let remote_parent = remote_path_buf.parent().unwrap_or_else(|| Path::new(""));
    let gfxr_stem = remote_path_buf
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            dive_proto::DiveError::invalid_argument(format!(
                "capture file path has no stem: {remote_path}"
            ))
        })?;
    let remote_components = component_paths(remote_parent, gfxr_stem)?;
    let local_components = component_paths(out_dir, gfxr_stem)?;

    download_one(&client, &remote_path, &local_components.gfxr, &ctx)?;
    for (remote, local) in [
        (&remote_components.gfxa, &local_components.gfxa),
        (
            &remote_components.perf_counter_csv,
            &local_components.perf_counter_csv,
        ),
        (
            &remote_components.gpu_timing_csv,
            &local_components.gpu_timing_csv,
        ),
        (&remote_components.pm4_rd, &local_components.pm4_rd),
        (
            &remote_components.screenshot_png,
            &local_components.screenshot_png,
        ),
        (
            &remote_components.renderdoc_rdc,
            &local_components.renderdoc_rdc,
        ),
    ] {
        let remote_str = remote.to_string_lossy().into_owned();
        match client.get_capture_file_size(&remote_str) {
            Ok(Some(_)) => download_one(&client, &remote_str, local, &ctx)?,
            Ok(None) => tracing::debug!(path = %remote_str, "sibling not present on device, skipping"),
            Err(err) => tracing::warn!(path = %remote_str, %err, "failed to query sibling size"),
        }
    }

    client.disconnect();

    if local_components.gpu_timing_csv.exists() {
        run_report(&local_components.gpu_timing_csv)?;
    }
    Ok(())
}

fn download_one(client: &Client, remote_path: &str, local_path: &Path, ctx: &Context) -> Result<()> {
    tracing::info!(%remote_path, local_path = %local_path.display(), "downloading");
    client.download_file_from_server(
        remote_path,
        local_path,
        ctx,
        Some(&mut |written| tracing::debug!(written, "download progress")),
    )
}

fn run_report(csv: &Path) -> Result<()> {
    let ctx = Context::background();
    let mut table = AvailableTimingTable::new();
    table.load_from_csv(csv, &ctx)?;

    if let Some(stats) = table.stats_by_type(ObjectType::Frame, 0) {
        println!(
            "frame: mean={:.3}ms median={:.3}ms",
            stats.mean_ms, stats.median_ms
        );
    }
    for id in 0.. {
        match table.stats_by_type(ObjectType::CommandBuffer, id) {
            Some(stats) => println!(
                "command buffer {id}: mean={:.3}ms median={:.3}ms",
                stats.mean_ms, stats.median_ms
            ),
            None => break,
        }
    }
    for id in 0.. {
        match table.stats_by_type(ObjectType::RenderPass, id) {
            Some(stats) => println!(
                "render pass {id}: mean={:.3}ms median={:.3}ms",
                stats.mean_ms, stats.median_ms
            ),
            None => break,
        }
    }
    println!("{} rows total", table.row_count());
    Ok(())
}
