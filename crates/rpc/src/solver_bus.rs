use std::time::Duration;

use async_trait::async_trait;
use intentdesk_core::config::SolverBusConfig;
use intentdesk_core::domain::intent::{PublishIntent, QuoteOption};
use intentdesk_core::domain::request::QuoteRequest;
use intentdesk_core::errors::IntentError;
use intentdesk_core::negotiation::SolverBus;
use serde_json::Value;
use tracing::{info, warn};

use crate::jsonrpc::{JsonRpcClient, RpcError};

pub const QUOTE_METHOD: &str = "quote";
pub const PUBLISH_INTENT_METHOD: &str = "publish_intent";

#[derive(Clone, Debug)]
pub struct SolverBusClient {
    rpc: JsonRpcClient,
}

impl SolverBusClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self { rpc: JsonRpcClient::new(url, timeout)? })
    }

    pub fn from_config(config: &SolverBusConfig) -> Result<Self, RpcError> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

#[async_trait]
impl SolverBus for SolverBusClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Vec<QuoteOption>, IntentError> {
        let Some(result) = self.rpc.call(QUOTE_METHOD, [request]).await? else {
            return Ok(Vec::new());
        };
        let Value::Array(entries) = result else {
            return Err(IntentError::Serialization(format!(
                "quote result is not a list of options: {result}"
            )));
        };
        let options = decode_options(entries);

        info!(
            event_name = "solver_bus.quoted",
            asset_in = %request.defuse_asset_identifier_in,
            asset_out = %request.defuse_asset_identifier_out,
            exact_amount_in = %request.exact_amount_in,
            option_count = options.len(),
            "solver bus quote received"
        );
        Ok(options)
    }

    /// The bus reply is returned whole; a JSON-RPC `error` member is the
    /// bus answering, not a transport failure.
    async fn publish_intent(&self, intent: &PublishIntent) -> Result<Value, IntentError> {
        let response = self.rpc.call_envelope(PUBLISH_INTENT_METHOD, [intent]).await?;
        match response.get("error").filter(|error| !error.is_null()) {
            Some(error) => warn!(
                event_name = "solver_bus.publish_refused",
                quote_hashes = intent.quote_hashes.len(),
                error = %error,
                "solver bus answered publish with an error"
            ),
            None => info!(
                event_name = "solver_bus.published",
                quote_hashes = intent.quote_hashes.len(),
                "intent published to solver bus"
            ),
        }
        Ok(response)
    }
}

/// Decodes each solver entry on its own; one malformed option must not hide
/// the rest of the market.
fn decode_options(entries: Vec<Value>) -> Vec<QuoteOption> {
    let mut options = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<QuoteOption>(entry) {
            Ok(option) => options.push(option),
            Err(error) => warn!(
                event_name = "solver_bus.option_skipped",
                index,
                error = %error,
                "skipping malformed quote option"
            ),
        }
    }
    options
}
