//! Core value types shared by the reconciliation engine.
//!
//! Tip records are read fresh on every check and never persisted. Alert
//! events are built per failure and handed straight to the notifier.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a Bitcoin block hash in bytes.
pub const BLOCK_HASH_LEN: usize = 32;

/// A Bitcoin block hash in the byte order used by RPC interfaces (big-endian display).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHash([u8; BLOCK_HASH_LEN]);

/// Error returned when a string is not a valid block hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid block hash {input:?}: {reason}")]
pub struct BlockHashParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl BlockHash {
    /// Wrap raw hash bytes.
    pub fn from_bytes(bytes: [u8; BLOCK_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as accepted by bitcoind.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for BlockHash {
    type Err = BlockHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = [0_u8; BLOCK_HASH_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|e| BlockHashParseError {
            input: s.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A chain tip as reported by one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    /// Block height of the tip.
    #[serde(alias = "blockheight")]
    pub height: u64,
    /// Hash of the tip block.
    #[serde(alias = "blockhash")]
    pub hash: BlockHash,
}

/// Classification of a failed reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Relay and reference heights are too far apart.
    Divergence,
    /// The main-chain membership query itself failed.
    LookupError,
    /// The relay tip is no longer on the reference main chain.
    ReorgSuspected,
    /// Any other non-transient failure during the check.
    GenericError,
    /// Every attempt hit a transient failure; the round proved nothing.
    Inconclusive,
}

impl AlertCategory {
    /// Stable snake_case name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Divergence => "divergence",
            Self::LookupError => "lookup_error",
            Self::ReorgSuspected => "reorg_suspected",
            Self::GenericError => "generic_error",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reconciliation failure, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    /// Label of the monitored chain (e.g. "SOLANA").
    pub chain_id: String,
    /// What kind of failure this is.
    pub category: AlertCategory,
    /// Human-readable description.
    pub message: String,
    /// When the failure was detected.
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Build an event stamped with the current time.
    pub fn new(chain_id: &str, category: AlertCategory, message: String) -> Self {
        Self {
            chain_id: chain_id.to_owned(),
            category,
            message,
            raised_at: Utc::now(),
        }
    }

    /// Relay and reference heights differ by more than the allowed threshold.
    ///
    /// `difference` is `reference - relay`, so a negative value means the
    /// relay claims to be ahead of bitcoind.
    pub fn divergence(chain_id: &str, relay_height: u64, reference_height: u64) -> Self {
        let difference = signed_difference(reference_height, relay_height);
        Self::new(
            chain_id,
            AlertCategory::Divergence,
            format!(
                "{chain_id} btc relay blockheight difference too high ({difference})! \
                 BTCRelay: {relay_height} Bitcoin: {reference_height}"
            ),
        )
    }

    /// The membership lookup for the relay tip failed.
    pub fn lookup_error(chain_id: &str, hash: &BlockHash, error: &str) -> Self {
        Self::new(
            chain_id,
            AlertCategory::LookupError,
            format!(
                "{chain_id} btc relay error getting tip header from bitcoind, \
                 blockhash: {hash} ({error})"
            ),
        )
    }

    /// The relay tip is not part of the reference main chain.
    pub fn reorg_suspected(chain_id: &str, hash: &BlockHash) -> Self {
        Self::new(
            chain_id,
            AlertCategory::ReorgSuspected,
            format!("{chain_id} btc relay tip not in main chain, blockhash: {hash}"),
        )
    }

    /// Any other check failure.
    pub fn generic(chain_id: &str, error: &str) -> Self {
        Self::new(
            chain_id,
            AlertCategory::GenericError,
            format!("{chain_id} watchdog error: {error}"),
        )
    }

    /// Every attempt of a round failed transiently.
    pub fn inconclusive(chain_id: &str, attempts: u32, last_error: &str) -> Self {
        Self::new(
            chain_id,
            AlertCategory::Inconclusive,
            format!(
                "{chain_id} watchdog check inconclusive after {attempts} attempts, \
                 last error: {last_error}"
            ),
        )
    }
}

/// `minuend - subtrahend` as a signed value without overflow.
pub fn signed_difference(minuend: u64, subtrahend: u64) -> i128 {
    i128::from(minuend).saturating_sub(i128::from(subtrahend))
}
