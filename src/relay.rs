//! Relay tip source backed by a JSON-RPC endpoint.
//!
//! The endpoint is expected to expose the relay contract's stored tip under a
//! single method taking the contract address, answering with
//! `{ "blockheight": <u64>, "blockhash": "<hex>" }`.
//!
//! No chain node serves this method natively. Reading the tip means decoding
//! contract state (a Solana account, a Starknet storage slot), which needs the
//! chain's SDK. `rpc_url` must therefore point at an adapter or sidecar that
//! performs that read and answers the call above, not at the raw chain RPC.
//! A raw node answers with "method not found", which surfaces as a generic
//! error alert on every round.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::rpc::JsonRpcClient;
use crate::source::{RelayTipSource, SourceError};
use crate::types::TipRecord;

/// Default RPC method returning the relay tip.
pub const DEFAULT_TIP_METHOD: &str = "btcrelay_getTipData";

/// Reads the tip recorded by one relay contract.
#[derive(Debug, Clone)]
pub struct JsonRpcRelayTipSource {
    rpc: JsonRpcClient,
    contract_address: String,
    tip_method: String,
}

impl JsonRpcRelayTipSource {
    /// Create a source for `contract_address` served at `url`.
    pub fn new(url: String, contract_address: String, tip_method: String, timeout: Duration) -> Self {
        Self {
            rpc: JsonRpcClient::new(url, None, timeout),
            contract_address,
            tip_method,
        }
    }

    /// Relay contract address.
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }
}

#[async_trait]
impl RelayTipSource for JsonRpcRelayTipSource {
    async fn tip(&self) -> Result<TipRecord, SourceError> {
        self.rpc
            .call(&self.tip_method, &[json!(self.contract_address)])
            .await
    }
}
