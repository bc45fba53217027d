//! Minimal JSON-RPC 2.0 client shared by the bitcoind and relay sources.
//!
//! Failures are classified here, at the transport boundary: anything that
//! prevented a response from arriving is transient, everything the remote
//! side actually said is an application error.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::source::{SourceError, SourceErrorKind};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic auth credentials for an RPC endpoint.
#[derive(Clone)]
pub struct RpcAuth {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for RpcAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// JSON-RPC request envelope.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    /// Protocol version, always "2.0".
    pub jsonrpc: &'static str,
    /// Request id.
    pub id: u64,
    /// Method name.
    pub method: &'a str,
    /// Positional parameters.
    pub params: &'a [Value],
}

/// JSON-RPC response envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    /// Result payload; `null` when `error` is set.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error object, if the call failed.
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC error object.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    /// Error code.
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
}

/// A JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    url: String,
    auth: Option<RpcAuth>,
    timeout: Duration,
    client: reqwest::Client,
}

impl JsonRpcClient {
    /// Create a client for `url`.
    pub fn new(url: String, auth: Option<RpcAuth>, timeout: Duration) -> Self {
        Self {
            url,
            auth,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its `result` as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] classified as transient for connect, timeout and
    /// gateway failures, and as an application error otherwise.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<T, SourceError> {
        let result = self.call_raw(method, params).await?;
        serde_json::from_value(result).map_err(|e| SourceError::Decode {
            method: method.to_owned(),
            message: e.to_string(),
        })
    }

    /// Call `method` and return its raw `result`, or the RPC error object as
    /// [`SourceError::Rpc`].
    ///
    /// # Errors
    ///
    /// See [`JsonRpcClient::call`].
    pub async fn call_raw(&self, method: &str, params: &[Value]) -> Result<Value, SourceError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let mut request = self.client.post(&self.url).timeout(self.timeout).json(&body);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        debug!(url = %self.url, method, "rpc call");
        let response = request
            .send()
            .await
            .map_err(|e| network_error(method, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| network_error(method, &e))?;

        // bitcoind answers RPC errors with HTTP 500 and a JSON body, so try the
        // envelope before falling back to the status code.
        let envelope = serde_json::from_str::<RpcResponse>(&text);
        match envelope {
            Ok(RpcResponse {
                error: Some(error), ..
            }) => Err(SourceError::Rpc {
                method: method.to_owned(),
                code: error.code,
                message: error.message,
            }),
            Ok(RpcResponse { result, .. }) if status.is_success() => {
                Ok(result.unwrap_or(Value::Null))
            }
            Ok(_) => Err(SourceError::HttpStatus {
                method: method.to_owned(),
                status: status.as_u16(),
                body: truncate_body(&text),
            }),
            Err(_) if !status.is_success() => Err(SourceError::HttpStatus {
                method: method.to_owned(),
                status: status.as_u16(),
                body: truncate_body(&text),
            }),
            Err(e) => Err(SourceError::Decode {
                method: method.to_owned(),
                message: e.to_string(),
            }),
        }
    }
}

/// Map a reqwest failure onto the retry taxonomy.
fn network_error(method: &str, err: &reqwest::Error) -> SourceError {
    let kind = if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        SourceErrorKind::Transient
    } else {
        SourceErrorKind::Application
    };
    SourceError::Network {
        method: method.to_owned(),
        message: err.to_string(),
        kind,
    }
}

fn truncate_body(raw: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 256;

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = collapsed
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}
