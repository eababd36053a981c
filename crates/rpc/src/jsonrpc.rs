use std::time::Duration;

use intentdesk_core::errors::IntentError;
use intentdesk_core::network::NetworkFailure;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Both the solver bus and the RPC node accept a constant request id.
pub const REQUEST_ID: &str = "dontcare";
pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("transport failure calling `{method}`: {message}")]
    Transport { method: String, message: String },
    #[error("`{method}` timed out after {timeout_secs}s")]
    Timeout { method: String, timeout_secs: u64 },
    #[error("`{method}` failed with rpc error {code}: {message}")]
    Remote { method: String, code: i64, message: String },
    #[error("`{method}` returned an unreadable response: {message}")]
    Decode { method: String, message: String },
}

impl From<RpcError> for NetworkFailure {
    fn from(error: RpcError) -> Self {
        let message = error.to_string();
        match error {
            RpcError::Timeout { .. } => NetworkFailure::timeout(message),
            RpcError::Remote { .. } => NetworkFailure::rejected(message),
            RpcError::Client(_) | RpcError::Transport { .. } | RpcError::Decode { .. } => {
                NetworkFailure::transport(message)
            }
        }
    }
}

/// Solver-bus view of a failure: a refusal by the bus is a service failure,
/// not a settlement rejection.
impl From<RpcError> for IntentError {
    fn from(error: RpcError) -> Self {
        let message = error.to_string();
        match error {
            RpcError::Timeout { .. } => IntentError::Timeout(message),
            RpcError::Decode { .. } => IntentError::Serialization(message),
            RpcError::Client(_) | RpcError::Transport { .. } | RpcError::Remote { .. } => {
                IntentError::TransportError(message)
            }
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    id: &'a str,
    jsonrpc: &'a str,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Deserialize)]
struct JsonRpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    cause: Option<Value>,
}

impl JsonRpcErrorBody {
    /// Node errors carry the useful part in `cause.name` and `data`.
    fn describe(&self) -> String {
        let mut parts = vec![self.message.clone()];
        if let Some(name) = self.cause.as_ref().and_then(|cause| cause.get("name")) {
            parts.push(name.as_str().map_or_else(|| name.to_string(), str::to_string));
        }
        if let Some(data) = &self.data {
            parts.push(data.as_str().map_or_else(|| data.to_string(), str::to_string));
        }
        parts.retain(|part| !part.is_empty());
        parts.join(": ")
    }
}

#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    http: Client,
    url: String,
    timeout: Duration,
}

impl JsonRpcClient {
    /// Every call made through this client is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|error| RpcError::Client(error.to_string()))?;

        Ok(Self { http, url: url.into(), timeout })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the `result` member, `None` when the service omitted it.
    pub async fn call<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Option<Value>, RpcError> {
        let (status, body) = self.exchange(method, params).await?;
        let envelope: JsonRpcResponse = serde_json::from_value(body).map_err(|error| {
            RpcError::Decode { method: method.to_string(), message: error.to_string() }
        })?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Remote {
                method: method.to_string(),
                code: error.code,
                message: error.describe(),
            });
        }

        debug!(
            event_name = "rpc.call_completed",
            url = %self.url,
            method,
            status = status.as_u16(),
            has_result = envelope.result.is_some(),
            "json-rpc call completed"
        );
        Ok(envelope.result.filter(|result| !result.is_null()))
    }

    /// The whole response body, `error` member included. Only connection
    /// failures, timeouts and non-JSON bodies are errors here.
    pub async fn call_envelope<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Value, RpcError> {
        let (status, body) = self.exchange(method, params).await?;
        debug!(
            event_name = "rpc.call_completed",
            url = %self.url,
            method,
            status = status.as_u16(),
            has_error = body.get("error").is_some_and(|error| !error.is_null()),
            "json-rpc call completed"
        );
        Ok(body)
    }

    async fn exchange<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<(StatusCode, Value), RpcError> {
        let request = JsonRpcRequest { id: REQUEST_ID, jsonrpc: JSONRPC_VERSION, method, params };
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|error| self.transport_error(method, error))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|error| self.transport_error(method, error))?;
        match serde_json::from_slice(&body) {
            Ok(body) => Ok((status, body)),
            Err(_) if !status.is_success() => Err(RpcError::Transport {
                method: method.to_string(),
                message: format!("http status {status}"),
            }),
            Err(error) => {
                Err(RpcError::Decode { method: method.to_string(), message: error.to_string() })
            }
        }
    }

    /// Like [`Self::call`] but a missing result is a decode failure.
    pub async fn call_required<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Value, RpcError> {
        self.call(method, params).await?.ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            message: "response carried no result".to_string(),
        })
    }

    fn transport_error(&self, method: &str, error: reqwest::Error) -> RpcError {
        if error.is_timeout() {
            RpcError::Timeout { method: method.to_string(), timeout_secs: self.timeout.as_secs() }
        } else {
            RpcError::Transport { method: method.to_string(), message: error.to_string() }
        }
    }
}
