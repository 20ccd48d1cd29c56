#![forbid(unsafe_code)]

//! `squadron-worker`: worker process launched by a leader's supervisor.
//!
//! Exit codes: 0 after the intentional-stop signal, 1 for identity or
//! connection failures, 2 when the leader dismissed the worker.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use squadron::cli::{init_tracing, shutdown_signal, LogFormat};
use squadron::config::{GlobalConfig, WorkerConfig};
use squadron::models::identity::AgentIdentity;
use squadron::skills::dry_run::DryRunWorld;
use squadron::transport::client::{self, Hello};
use squadron::worker::agent::{establish, run_agent, AgentSettings, EXIT_FATAL};

/// Simulated time per unit of skill work.
const DRY_RUN_STEP: Duration = Duration::from_millis(250);

/// Time left for the final status report to reach the leader.
const FLUSH_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "squadron-worker", about = "Squadron worker process", version, long_about = None)]
struct Cli {
    /// Worker name.
    #[arg(short = 'n', long)]
    name: String,

    /// Leader the worker reports to.
    #[arg(short = 'l', long)]
    leader: String,

    /// Identifying count of this process.
    #[arg(short = 'c', long, default_value_t = 0)]
    count_id: u32,

    /// Message delivered to the worker on start.
    #[arg(short = 'm', long)]
    init_message: Option<String>,

    /// Local socket name of the leader.
    #[arg(short = 'p', long, default_value = "squadron")]
    endpoint: String,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        std::process::exit(EXIT_FATAL);
    }

    let code = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(run(args)),
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(args: Cli) -> i32 {
    let worker_config = match &args.config {
        Some(path) => match GlobalConfig::load_from_path(path) {
            Ok(config) => config.worker,
            Err(err) => {
                error!(%err, "failed to load configuration");
                return EXIT_FATAL;
            }
        },
        None => WorkerConfig::default(),
    };

    let identity = match AgentIdentity::worker(args.name.trim(), &args.leader) {
        Ok(identity) => identity,
        Err(err) => {
            error!(name = args.name, %err, "invalid worker identity");
            return EXIT_FATAL;
        }
    };
    info!(
        worker = identity.name(),
        leader = args.leader,
        count_id = args.count_id,
        "initializing worker"
    );

    let settings = AgentSettings::from_config(&worker_config, args.init_message);
    let world = DryRunWorld::new(DRY_RUN_STEP);
    let hello = Hello {
        worker: identity.name().to_owned(),
        leader: args.leader.clone(),
        count_id: args.count_id,
    };

    let (session, link) = match establish(
        &identity,
        &world,
        client::connect(&args.endpoint, hello),
        settings.spawn_timeout,
    )
    .await
    {
        Ok(connected) => connected,
        Err(err) => {
            error!(%err, "worker failed to connect");
            return EXIT_FATAL;
        }
    };

    let reason = run_agent(identity, session, link, &settings, shutdown_signal()).await;
    let code = reason.exit_code();
    info!(?reason, code, "worker exiting");
    tokio::time::sleep(FLUSH_GRACE).await;
    code
}
