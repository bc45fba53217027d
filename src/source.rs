//! Read-only capabilities the watchdog consumes from its two tip sources.
//!
//! The relay side only has to report its current tip. The reference side
//! (a bitcoind node) reports its own tip height and answers whether a block
//! hash is on its main chain. Both report failures as [`SourceError`], which
//! carries an explicit [`SourceErrorKind`] so callers never classify errors
//! by their text.

use async_trait::async_trait;

use crate::types::{BlockHash, TipRecord};

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Infrastructure flakiness: connection refused, timeout, gateway errors.
    Transient,
    /// Anything else: RPC errors, malformed payloads, unexpected statuses.
    Application,
}

/// Errors returned by tip sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request never produced a usable HTTP response.
    #[error("network failure calling {method}: {message}")]
    Network {
        /// RPC method being called.
        method: String,
        /// Underlying transport error text.
        message: String,
        /// Retry classification.
        kind: SourceErrorKind,
    },
    /// The endpoint answered with a non-success HTTP status.
    #[error("{method} returned HTTP {status}: {body}")]
    HttpStatus {
        /// RPC method being called.
        method: String,
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// The endpoint answered with a JSON-RPC error object.
    #[error("{method} failed with RPC error {code}: {message}")]
    Rpc {
        /// RPC method being called.
        method: String,
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The response could not be decoded.
    #[error("malformed {method} response: {message}")]
    Decode {
        /// RPC method being called.
        method: String,
        /// Decoder error text.
        message: String,
    },
}

impl SourceError {
    /// Retry classification of this error.
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            Self::Network { kind, .. } => *kind,
            Self::HttpStatus { status, .. } if is_gateway_status(*status) => {
                SourceErrorKind::Transient
            }
            Self::HttpStatus { .. } | Self::Rpc { .. } | Self::Decode { .. } => {
                SourceErrorKind::Application
            }
        }
    }

    /// Shorthand for `kind() == SourceErrorKind::Transient`.
    pub fn is_transient(&self) -> bool {
        self.kind() == SourceErrorKind::Transient
    }

    /// Build a transient network error, mostly useful for tests and adapters.
    pub fn transient(method: &str, message: impl Into<String>) -> Self {
        Self::Network {
            method: method.to_owned(),
            message: message.into(),
            kind: SourceErrorKind::Transient,
        }
    }
}

/// HTTP statuses produced by proxies in front of a node that is restarting or overloaded.
fn is_gateway_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

/// A relay contract's view of the Bitcoin tip.
#[async_trait]
pub trait RelayTipSource: Send + Sync {
    /// Current tip recorded by the relay.
    async fn tip(&self) -> Result<TipRecord, SourceError>;
}

/// Ground-truth Bitcoin chain data.
#[async_trait]
pub trait ReferenceChain: Send + Sync {
    /// Height of the node's best block.
    async fn tip_height(&self) -> Result<u64, SourceError>;

    /// Whether `hash` is part of the node's main chain.
    async fn is_in_main_chain(&self, hash: &BlockHash) -> Result<bool, SourceError>;
}
