//! fwsync service binary.
//!
//! Wires the engine together from a TOML config file: seeds the agent
//! inventory, starts the collection and expiry schedulers, and shuts both
//! down cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fwsync_client::AgentClient;
use fwsync_core::SettingsSource;
use fwsync_engine::scheduler::{run_collection_loop, run_expiry_loop};
use fwsync_engine::{Collector, ExpirySweeper};
use fwsync_store::{MemoryStore, SettingsHandle, TracingOperationLog};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "fwsyncd", about = "Firewall policy collection and reconciliation daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "/etc/fwsync/config.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::load(&cli.config)?;
    let inventory = config.agent_inventory();
    info!(
        config = %cli.config.display(),
        agents = inventory.len(),
        "fwsyncd starting"
    );

    let store = Arc::new(MemoryStore::new());
    store.seed_agents(inventory);
    let log = Arc::new(TracingOperationLog);
    let settings: Arc<dyn SettingsSource> =
        Arc::new(SettingsHandle::new(config.settings_snapshot()));

    let client = AgentClient::new(&config.client_config())
        .context("building the agent HTTP client")?;
    let collector = Arc::new(Collector::new(Arc::clone(&store), Arc::clone(&log), client));
    let sweeper = Arc::new(ExpirySweeper::new(store, log));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collection = tokio::spawn(run_collection_loop(
        collector,
        Arc::clone(&settings),
        shutdown_rx.clone(),
    ));
    let expiry = tokio::spawn(run_expiry_loop(sweeper, settings, shutdown_rx));

    wait_for_signal().await;
    info!("shutdown signal received, stopping schedulers");
    // Receivers observe the flip even if the send itself reports no
    // remaining receivers.
    let _ = shutdown_tx.send(true);

    for (name, handle) in [("collection", collection), ("expiry", expiry)] {
        if let Err(err) = handle.await {
            error!(scheduler = name, error = %err, "scheduler task panicked");
        }
    }
    info!("fwsyncd stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler, using SIGINT only");
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to wait for SIGINT");
            }
            return;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "failed to wait for SIGINT");
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for SIGINT");
    }
}
