#![forbid(unsafe_code)]

//! `squadron`: leader binary.
//!
//! Loads configuration, opens the worker endpoint, spawns the configured
//! workers under supervision, and serves the status endpoint until a
//! shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use squadron::cli::{init_tracing, shutdown_signal, LogFormat};
use squadron::config::GlobalConfig;
use squadron::leader::{http, Leader};
use squadron::supervisor::OsLauncher;
use squadron::{AppError, Result};

#[derive(Debug, Parser)]
#[command(name = "squadron", about = "Leader of a supervised worker squad", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("squadron leader bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    let http_port = config.http_port;
    info!(leader = config.leader, workers = config.workers.len(), "configuration loaded");

    // ── Build the leader context ────────────────────────
    let leader = Leader::start(config, Some(args.config.clone()), Arc::new(OsLauncher))?;
    leader.listen()?;

    // ── Status endpoint ─────────────────────────────────
    let http_handle = (http_port != 0).then(|| {
        let leader = Arc::clone(&leader);
        let ct = leader.cancellation().child_token();
        tokio::spawn(async move {
            if let Err(err) = http::serve_status(leader, http_port, ct).await {
                error!(%err, "status endpoint failed");
            }
        })
    });

    // ── Spawn workers ───────────────────────────────────
    let started = leader.spawn_workers();
    info!(?started, "leader ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    leader.shutdown().await;

    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    info!("squadron leader shut down");

    Ok(())
}
