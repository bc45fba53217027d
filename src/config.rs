//! Configuration loading for the watchdog.
//!
//! Loads `watchdog.toml` with per-section defaults. All sections use
//! `#[serde(default)]` so a minimal config only needs `[[chains]]` entries.
//! Secrets are never stored in the file; sections name the environment
//! variables that hold them instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::check::CheckPolicy;

/// Top-level watchdog configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WatchdogConfig {
    /// Reference bitcoind node.
    #[serde(default)]
    pub bitcoin: BitcoinConfig,

    /// Check timing and thresholds.
    #[serde(default)]
    pub checks: ChecksConfig,

    /// Alert rate limiting.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Telegram notification targets.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// One entry per monitored relay deployment.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

/// Reference bitcoind node settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BitcoinConfig {
    /// JSON-RPC endpoint (e.g. "http://127.0.0.1:8332").
    #[serde(default = "default_bitcoin_rpc_url")]
    pub rpc_url: String,

    /// Environment variable holding the RPC username.
    #[serde(default = "default_rpc_user_env")]
    pub rpc_user_env: String,

    /// Environment variable holding the RPC password.
    #[serde(default = "default_rpc_password_env")]
    pub rpc_password_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_bitcoin_rpc_url(),
            rpc_user_env: default_rpc_user_env(),
            rpc_password_env: default_rpc_password_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Check timing and reconciliation thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChecksConfig {
    /// Seconds between check rounds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Largest tolerated height difference between relay and bitcoind.
    #[serde(default = "default_max_height_difference")]
    pub max_height_difference: u64,

    /// Attempts per round when sources fail transiently.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Seconds to wait between attempts.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Alert when every attempt of a round failed transiently.
    #[serde(default = "default_true")]
    pub alert_on_inconclusive: bool,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_height_difference: default_max_height_difference(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay_secs(),
            alert_on_inconclusive: true,
        }
    }
}

impl ChecksConfig {
    /// Period between check rounds.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Reconciliation policy for every watchdog.
    pub fn policy(&self) -> CheckPolicy {
        CheckPolicy {
            max_height_difference: self.max_height_difference,
            retry_count: self.retry_count,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            alert_on_inconclusive: self.alert_on_inconclusive,
        }
    }
}

/// Alert rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertsConfig {
    /// Minutes between two deliveries for the same chain.
    #[serde(default = "default_cooldown_mins")]
    pub cooldown_mins: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_mins: default_cooldown_mins(),
        }
    }
}

impl AlertsConfig {
    /// Cooldown as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_mins.saturating_mul(60))
    }
}

/// Telegram notification targets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    /// Environment variable name holding the bot token.
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// User or chat IDs to receive alerts.
    #[serde(default)]
    pub notify_users: Vec<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            notify_users: Vec::new(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for daily-rotated JSON logs. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// `tracing` filter directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: default_log_filter(),
        }
    }
}

/// One monitored relay deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Label used in logs and alerts (e.g. "SOLANA").
    pub name: String,

    /// JSON-RPC adapter serving the relay tip (see [`crate::relay`]), not the
    /// chain's own RPC node.
    pub rpc_url: String,

    /// Relay contract address on that chain.
    pub contract_address: String,

    /// RPC method returning the relay tip.
    #[serde(default = "default_tip_method")]
    pub tip_method: String,

    /// Per-request timeout in seconds; falls back to the bitcoin setting.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl WatchdogConfig {
    /// Validate that configuration values are within sane bounds.
    ///
    /// An empty chain list is accepted here; the scheduler refuses to start
    /// without chains.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.checks.interval_secs >= 10,
            "checks.interval_secs must be >= 10"
        );
        anyhow::ensure!(
            (1..=20).contains(&self.checks.retry_count),
            "checks.retry_count must be in [1, 20]"
        );
        anyhow::ensure!(
            self.checks.retry_delay_secs <= 600,
            "checks.retry_delay_secs must be <= 600"
        );
        anyhow::ensure!(
            self.bitcoin.request_timeout_secs >= 1,
            "bitcoin.request_timeout_secs must be >= 1"
        );
        validate_http_url("bitcoin.rpc_url", &self.bitcoin.rpc_url)?;
        tracing_subscriber::EnvFilter::try_new(&self.logging.filter)
            .with_context(|| format!("logging.filter '{}' is invalid", self.logging.filter))?;

        let mut seen = HashSet::new();
        for chain in &self.chains {
            anyhow::ensure!(
                !chain.name.trim().is_empty(),
                "chains.name must not be empty"
            );
            anyhow::ensure!(
                seen.insert(chain.name.as_str()),
                "duplicate chain name '{}'",
                chain.name
            );
            validate_http_url(&format!("chains.{}.rpc_url", chain.name), &chain.rpc_url)?;
            anyhow::ensure!(
                !chain.contract_address.trim().is_empty(),
                "chains.{}.contract_address must not be empty",
                chain.name
            );
            anyhow::ensure!(
                !chain.tip_method.trim().is_empty(),
                "chains.{}.tip_method must not be empty",
                chain.name
            );
            anyhow::ensure!(
                chain.request_timeout_secs != Some(0),
                "chains.{}.request_timeout_secs must be >= 1",
                chain.name
            );
        }
        Ok(())
    }

    /// Request timeout for the reference node.
    pub fn bitcoin_timeout(&self) -> Duration {
        Duration::from_secs(self.bitcoin.request_timeout_secs)
    }

    /// Request timeout for `chain`.
    pub fn chain_timeout(&self, chain: &ChainConfig) -> Duration {
        Duration::from_secs(
            chain
                .request_timeout_secs
                .unwrap_or(self.bitcoin.request_timeout_secs),
        )
    }
}

fn validate_http_url(field: &str, raw: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("{field} is not a valid URL"))?;
    anyhow::ensure!(
        matches!(parsed.scheme(), "http" | "https"),
        "{field} must use http or https"
    );
    Ok(())
}

/// Parse configuration from TOML text and validate it.
///
/// # Errors
///
/// Returns an error if the text cannot be parsed or fails validation.
pub fn parse_config(contents: &str) -> anyhow::Result<WatchdogConfig> {
    let config: WatchdogConfig =
        toml::from_str(contents).context("failed to parse watchdog config")?;
    config.validate()?;
    Ok(config)
}

/// Load watchdog configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<WatchdogConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read watchdog config at {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("invalid watchdog config at {}", path.display()))
}

/// Default config file location (e.g. `~/.config/btc-relay-watchdog/watchdog.toml`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "btc-relay-watchdog")
        .context("could not determine home directory")?;
    Ok(dirs.config_dir().join("watchdog.toml"))
}

// Default value functions for serde.

fn default_bitcoin_rpc_url() -> String {
    "http://127.0.0.1:8332".to_owned()
}

fn default_rpc_user_env() -> String {
    "BTC_RPC_USERNAME".to_owned()
}

fn default_rpc_password_env() -> String {
    "BTC_RPC_PASSWORD".to_owned()
}

fn default_request_timeout_secs() -> u64 {
    crate::rpc::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_interval_secs() -> u64 {
    crate::scheduler::DEFAULT_CHECK_INTERVAL.as_secs()
}

fn default_max_height_difference() -> u64 {
    3
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_cooldown_mins() -> u64 {
    60
}

fn default_bot_token_env() -> String {
    "WATCHDOG_TELEGRAM_TOKEN".to_owned()
}

fn default_log_filter() -> String {
    "info".to_owned()
}

fn default_tip_method() -> String {
    crate::relay::DEFAULT_TIP_METHOD.to_owned()
}
