//! Log output for the watchdog, driven by the `[logging]` config section.
//!
//! Console output always goes to stderr (stdout carries `config` output).
//! When `[logging] dir` is set, a daily-rotated JSON file is added next to
//! the console layer. Each check round runs inside a span carrying `chain`
//! and `check_id`, and the JSON layer records that span on every line so
//! the file can be filtered per chain. `RUST_LOG` overrides `[logging] filter`.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// File name prefix of the rotated log (`watchdog.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "watchdog.log";

/// Keeps the file writer alive.
///
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    file: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether a JSON log file is being written.
    pub fn writes_file(&self) -> bool {
        self.file.is_some()
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    match &config.dir {
        Some(dir) => init_with_file(dir, &config.filter),
        None => {
            init_console(&config.filter)?;
            Ok(LoggingGuard { file: None })
        }
    }
}

fn init_with_file(logs_dir: &Path, filter: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(non_blocking);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard {
        file: Some(guard),
    })
}

fn init_console(filter: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}
