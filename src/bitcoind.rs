//! bitcoind JSON-RPC client used as the reference chain.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::rpc::{JsonRpcClient, RpcAuth};
use crate::source::{ReferenceChain, SourceError};
use crate::types::BlockHash;

/// bitcoind's `RPC_INVALID_ADDRESS_OR_KEY`, returned for unknown block hashes.
pub const RPC_BLOCK_NOT_FOUND: i64 = -5;

/// The subset of `getblockheader` (verbose) output the watchdog needs.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct BlockHeaderInfo {
    /// Block hash echoed back.
    pub hash: String,
    /// Confirmations on the main chain; `-1` for stale blocks.
    pub confirmations: i64,
    /// Height of the block.
    #[serde(default)]
    pub height: Option<u64>,
}

/// A bitcoind node reached over JSON-RPC.
#[derive(Debug, Clone)]
pub struct BitcoindRpc {
    rpc: JsonRpcClient,
}

impl BitcoindRpc {
    /// Create a client for the node at `url`.
    pub fn new(url: String, auth: Option<RpcAuth>, timeout: Duration) -> Self {
        Self {
            rpc: JsonRpcClient::new(url, auth, timeout),
        }
    }

    /// Node endpoint.
    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    /// Fetch verbose header data, or `None` when the node does not know the block.
    ///
    /// # Errors
    ///
    /// Returns any RPC failure other than "block not found".
    pub async fn block_header(
        &self,
        hash: &BlockHash,
    ) -> Result<Option<BlockHeaderInfo>, SourceError> {
        match self
            .rpc
            .call::<BlockHeaderInfo>("getblockheader", &[json!(hash.to_hex()), json!(true)])
            .await
        {
            Ok(header) => Ok(Some(header)),
            Err(SourceError::Rpc { code, .. }) if code == RPC_BLOCK_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ReferenceChain for BitcoindRpc {
    async fn tip_height(&self) -> Result<u64, SourceError> {
        self.rpc.call("getblockcount", &[]).await
    }

    async fn is_in_main_chain(&self, hash: &BlockHash) -> Result<bool, SourceError> {
        let Some(header) = self.block_header(hash).await? else {
            debug!(%hash, "block unknown to bitcoind");
            return Ok(false);
        };
        Ok(header.confirmations >= 1)
    }
}
