//! BTC relay watchdog.
//!
//! Periodically reconciles the Bitcoin tip recorded by on-chain relay
//! contracts against a bitcoind node, and raises rate-limited alerts when a
//! relay has drifted from the real chain or is tracking an orphaned block.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Wiring from configuration to watchdogs and scheduler.
pub mod app;
/// bitcoind JSON-RPC reference chain.
pub mod bitcoind;
/// Per-chain reconciliation and retry.
pub mod check;
/// Configuration loading and validation.
pub mod config;
/// Secrets from the environment.
pub mod credentials;
/// Logging setup.
pub mod logging;
/// Cooldown-gated alert dispatch.
pub mod notifier;
/// JSON-RPC relay tip source.
pub mod relay;
/// Shared JSON-RPC client.
pub mod rpc;
/// Periodic fan-out over all watchdogs.
pub mod scheduler;
/// Tip source capabilities and error taxonomy.
pub mod source;
/// Alert delivery channels.
pub mod transport;
/// Core value types.
pub mod types;
