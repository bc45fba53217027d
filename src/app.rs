//! Wiring from configuration to running watchdogs.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bitcoind::BitcoindRpc;
use crate::check::Watchdog;
use crate::config::WatchdogConfig;
use crate::credentials::Credentials;
use crate::notifier::Notifier;
use crate::relay::JsonRpcRelayTipSource;
use crate::rpc::RpcAuth;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::source::ReferenceChain;
use crate::transport::{AlertTransport, LogOnlyTransport, TelegramTransport};

/// Build the bitcoind client, with basic auth when both credentials are set.
pub fn build_reference_chain(config: &WatchdogConfig, credentials: &Credentials) -> BitcoindRpc {
    let auth = match (
        credentials.get(&config.bitcoin.rpc_user_env),
        credentials.get(&config.bitcoin.rpc_password_env),
    ) {
        (Some(username), Some(password)) => Some(RpcAuth {
            username: username.to_owned(),
            password: password.to_owned(),
        }),
        _ => {
            warn!(
                user_env = %config.bitcoin.rpc_user_env,
                password_env = %config.bitcoin.rpc_password_env,
                "bitcoind credentials not set, calling without authentication"
            );
            None
        }
    };
    BitcoindRpc::new(
        config.bitcoin.rpc_url.clone(),
        auth,
        config.bitcoin_timeout(),
    )
}

/// Build the alert transport from config and credentials.
///
/// Telegram when recipients are configured, otherwise a transport that only
/// logs, so no alert is reported as delivered when nobody received it.
///
/// # Errors
///
/// Returns an error if recipients are configured but the bot token is missing.
pub fn build_transport(
    config: &WatchdogConfig,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn AlertTransport>> {
    if config.telegram.notify_users.is_empty() {
        warn!("telegram.notify_users is empty, alerts will only be logged");
        return Ok(Arc::new(LogOnlyTransport));
    }
    let token = credentials.require(&config.telegram.bot_token_env)?;
    Ok(Arc::new(TelegramTransport::new(
        &token,
        config.telegram.notify_users.clone(),
    )))
}

/// One watchdog per `[[chains]]` entry, all sharing `reference` and `transport`.
pub fn build_watchdogs(
    config: &WatchdogConfig,
    reference: Arc<dyn ReferenceChain>,
    transport: Arc<dyn AlertTransport>,
) -> Vec<Watchdog> {
    let policy = config.checks.policy();
    config
        .chains
        .iter()
        .map(|chain| {
            info!(
                chain = %chain.name,
                rpc_url = %chain.rpc_url,
                contract = %chain.contract_address,
                "watchdog configured"
            );
            let relay = JsonRpcRelayTipSource::new(
                chain.rpc_url.clone(),
                chain.contract_address.clone(),
                chain.tip_method.clone(),
                config.chain_timeout(chain),
            );
            let notifier = Notifier::new(
                &chain.name,
                Arc::clone(&transport),
                config.alerts.cooldown(),
            );
            Watchdog::new(
                &chain.name,
                Arc::new(relay),
                Arc::clone(&reference),
                notifier,
                policy.clone(),
            )
        })
        .collect()
}

/// Build the scheduler for every configured chain.
///
/// # Errors
///
/// Returns [`SchedulerError::NoChains`] when no chain is configured.
pub fn build_scheduler(
    config: &WatchdogConfig,
    reference: Arc<dyn ReferenceChain>,
    transport: Arc<dyn AlertTransport>,
) -> Result<Scheduler, SchedulerError> {
    let watchdogs = build_watchdogs(config, reference, transport);
    Scheduler::new(watchdogs, config.checks.interval())
}
