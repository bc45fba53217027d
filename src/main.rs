//! BTC relay watchdog CLI entry point.
//!
//! Provides `start`, `check`, and `config` subcommands for running the
//! watchdog daemon, performing a single reconciliation round, or printing
//! the resolved configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use btc_relay_watchdog::app;
use btc_relay_watchdog::check::CheckOutcome;
use btc_relay_watchdog::config::{default_config_path, load_config, WatchdogConfig};
use btc_relay_watchdog::credentials::{load_credentials, Credentials};
use btc_relay_watchdog::logging;
use btc_relay_watchdog::source::ReferenceChain;
use btc_relay_watchdog::transport::{AlertTransport, LogOnlyTransport};

/// Watchdog for on-chain BTC relay contracts.
#[derive(Parser)]
#[command(name = "btc-relay-watchdog", version, about)]
struct Cli {
    /// Path to `watchdog.toml` (defaults to the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Optional `.env` file to read secrets from.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the watchdog daemon until interrupted.
    Start,
    /// Run one reconciliation round for every chain and exit.
    Check {
        /// Log alerts instead of delivering them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };

    match cli.command {
        Command::Start => handle_start(&config_path, cli.env_file.as_deref()).await,
        Command::Check { dry_run } => {
            handle_check(&config_path, cli.env_file.as_deref(), dry_run).await
        }
        Command::Config => handle_config(&config_path),
    }
}

/// Run the watchdog daemon.
async fn handle_start(config_path: &Path, env_file: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let _logging_guard = logging::init(&config.logging)?;

    let credentials = load_credentials(env_file)?;
    let reference: Arc<dyn ReferenceChain> =
        Arc::new(app::build_reference_chain(&config, &credentials));
    let transport = app::build_transport(&config, &credentials)?;

    let scheduler = app::build_scheduler(&config, reference, transport)
        .context("cannot start watchdog")?;

    info!(
        config = %config_path.display(),
        chains = ?scheduler.chain_ids(),
        "watchdog started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("received shutdown signal");
    if shutdown_tx.send(true).is_err() {
        warn!("scheduler already stopped");
    }
    run.await.context("scheduler task failed")?;

    Ok(())
}

/// Run a single reconciliation round for every chain.
async fn handle_check(
    config_path: &Path,
    env_file: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let _logging_guard = logging::init(&config.logging)?;

    let credentials = load_credentials(env_file)?;

    let reference: Arc<dyn ReferenceChain> =
        Arc::new(app::build_reference_chain(&config, &credentials));
    let transport = check_transport(&config, &credentials, dry_run)?;

    let scheduler = app::build_scheduler(&config, reference, transport)
        .context("cannot run check")?;

    let mut failures = 0_usize;
    for (chain, result) in scheduler.run_once().await {
        match result {
            Ok(CheckOutcome::Healthy) => info!(chain = %chain, "healthy"),
            Ok(outcome) => {
                warn!(chain = %chain, ?outcome, "check did not pass");
                failures = failures.saturating_add(1);
            }
            Err(e) => {
                error!(chain = %chain, error = %format!("{e:#}"), "check errored");
                failures = failures.saturating_add(1);
            }
        }
    }

    anyhow::ensure!(failures == 0, "{failures} chain(s) failed the check");
    Ok(())
}

fn check_transport(
    config: &WatchdogConfig,
    credentials: &Credentials,
    dry_run: bool,
) -> anyhow::Result<Arc<dyn AlertTransport>> {
    if dry_run {
        return Ok(Arc::new(LogOnlyTransport));
    }
    app::build_transport(config, credentials)
}

/// Print the resolved configuration as TOML.
fn handle_config(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let rendered =
        toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("# {}", config_path.display());
    print!("{rendered}");
    Ok(())
}
