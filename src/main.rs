//! tracklink — durable GPS position uplink client
//!
//! # Usage
//!
//! ```bash
//! # Run the tracking pipeline indefinitely
//! tracklink track --config-file config.toml
//!
//! # One-shot provisioning: exchange the bootstrap code for credentials
//! tracklink setup --config-file config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tracklink::config::TrackerConfig;
use tracklink::ingest::{run_ingest, IngestLoop};
use tracklink::register;
use tracklink::resend::run_resend;
use tracklink::source::GpsdConnect;
use tracklink::spool::Spool;
use tracklink::types::ClientInfo;
use tracklink::uplink::{run_supervisor, TlsUplinkConnector, UplinkSlot};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "tracklink")]
#[command(about = "GPS position uplink client")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Start tracking: run the uplink pipeline indefinitely
    Track {
        /// Config file path
        #[arg(short, long, default_value = "config.toml")]
        config_file: PathBuf,
    },

    /// Perform one-shot bootstrap registration against the server
    Setup {
        /// Config file path (must contain a [bootstrap] section)
        #[arg(short, long)]
        config_file: PathBuf,
    },
}

// ============================================================================
// Task Supervision
// ============================================================================

/// Names for the long-running pipeline tasks, for shutdown logging.
#[derive(Debug, Clone, Copy)]
enum TaskName {
    Supervisor,
    ResendWorker,
    Ingest,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::Supervisor => write!(f, "Supervisor"),
            TaskName::ResendWorker => write!(f, "ResendWorker"),
            TaskName::Ingest => write!(f, "Ingest"),
        }
    }
}

/// Run the tracking pipeline until ctrl-c.
async fn run_track(config: TrackerConfig, cancel: CancellationToken) -> Result<()> {
    // Fatal startup errors: unloadable credentials, unusable spool dir.
    let connector =
        Arc::new(TlsUplinkConnector::from_config(&config.server).context("uplink setup failed")?);
    let spool = Arc::new(
        Spool::open(&config.storage.spool_dir).context("failed to open spool directory")?,
    );
    let slot = Arc::new(UplinkSlot::new());

    let identity = ClientInfo::new(&config.client.id);
    info!(
        client = %identity.id,
        endpoint = %config.server.endpoint,
        "Tracker configured"
    );

    let ingest = IngestLoop::new(
        identity,
        Arc::clone(&slot),
        Arc::clone(&spool),
        config.storage.snapshot_file.clone(),
    );

    let mut task_set: JoinSet<TaskName> = JoinSet::new();

    {
        let slot = Arc::clone(&slot);
        let cancel = cancel.clone();
        task_set.spawn(async move {
            run_supervisor(slot, connector, cancel).await;
            TaskName::Supervisor
        });
    }

    {
        let slot = Arc::clone(&slot);
        let spool = Arc::clone(&spool);
        let cancel = cancel.clone();
        task_set.spawn(async move {
            run_resend(slot, spool, cancel).await;
            TaskName::ResendWorker
        });
    }

    {
        let connector = GpsdConnect::new(config.source.gpsd_addr.clone());
        let cancel = cancel.clone();
        task_set.spawn(async move {
            run_ingest(ingest, connector, cancel).await;
            TaskName::Ingest
        });
    }

    info!("All pipeline tasks started");

    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(name) => info!("[{name}] Task stopped"),
            Err(e) => error!(error = %e, "Pipeline task panicked"),
        }
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down...");
        shutdown_token.cancel();
    });

    match args.command {
        SubCommand::Track { config_file } => {
            let config = TrackerConfig::load(&config_file)?;
            info!("Starting tracking");
            run_track(config, cancel_token).await
        }
        SubCommand::Setup { config_file } => {
            let config = TrackerConfig::load(&config_file)?;
            register::run_setup(&config).await
        }
    }
}
