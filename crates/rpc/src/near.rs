use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use intentdesk_core::config::NetworkConfig;
use intentdesk_core::errors::IntentError;
use intentdesk_core::network::{
    AccountView, CallOutcome, FunctionCall, NetworkFailure, SettlementNetwork,
};
use intentdesk_core::signer::KeyMaterial;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::jsonrpc::{JsonRpcClient, RpcError};
use crate::transaction::{
    decode_block_hash, Action, FunctionCallAction, PublicKey, Transaction,
};

pub const QUERY_METHOD: &str = "query";
pub const BROADCAST_TX_COMMIT_METHOD: &str = "broadcast_tx_commit";
const FINALITY: &str = "final";

#[derive(Debug, Deserialize)]
struct CallFunctionView {
    result: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct AccessKeyView {
    nonce: u64,
    block_hash: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResult {
    status: Value,
    transaction: TransactionSummary,
}

#[derive(Debug, Deserialize)]
struct TransactionSummary {
    hash: String,
}

/// JSON-RPC node client; transactions are signed with the account key it
/// was built with.
#[derive(Clone, Debug)]
pub struct NearRpcClient {
    rpc: JsonRpcClient,
    key: Arc<KeyMaterial>,
}

impl NearRpcClient {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        key: Arc<KeyMaterial>,
    ) -> Result<Self, RpcError> {
        Ok(Self { rpc: JsonRpcClient::new(url, timeout)?, key })
    }

    pub fn from_config(config: &NetworkConfig, key: Arc<KeyMaterial>) -> Result<Self, RpcError> {
        Self::new(config.rpc_url.clone(), Duration::from_secs(config.timeout_secs), key)
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    async fn query(&self, params: Value) -> Result<Value, NetworkFailure> {
        let result = self.rpc.call_required(QUERY_METHOD, params).await?;
        // Older nodes report query failures inside a successful result.
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(NetworkFailure::rejected(error.to_string()));
        }
        Ok(result)
    }

    async fn access_key(&self) -> Result<AccessKeyView, NetworkFailure> {
        let result = self
            .query(json!({
                "request_type": "view_access_key",
                "finality": FINALITY,
                "account_id": self.key.account_id(),
                "public_key": self.key.public_key(),
            }))
            .await?;
        serde_json::from_value(result)
            .map_err(|error| NetworkFailure::transport(format!("unreadable access key: {error}")))
    }

    fn build_transaction(
        &self,
        call: &FunctionCall,
        access: AccessKeyView,
    ) -> Result<Transaction, IntentError> {
        Ok(Transaction {
            signer_id: self.key.account_id().to_string(),
            public_key: PublicKey::ed25519(self.key.public_key_bytes()),
            nonce: access.nonce.saturating_add(1),
            receiver_id: call.contract_id.clone(),
            block_hash: decode_block_hash(&access.block_hash)?,
            actions: vec![Action::FunctionCall(FunctionCallAction {
                method_name: call.method.clone(),
                args: serde_json::to_vec(&call.args)?,
                gas: call.gas,
                deposit: call.deposit.0,
            })],
        })
    }
}

#[async_trait]
impl SettlementNetwork for NearRpcClient {
    async fn view_account(&self, account_id: &str) -> Result<AccountView, NetworkFailure> {
        let result = self
            .query(json!({
                "request_type": "view_account",
                "finality": FINALITY,
                "account_id": account_id,
            }))
            .await?;
        serde_json::from_value(result)
            .map_err(|error| NetworkFailure::transport(format!("unreadable account view: {error}")))
    }

    async fn view_function(
        &self,
        contract_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<Value, NetworkFailure> {
        let result = self
            .query(json!({
                "request_type": "call_function",
                "finality": FINALITY,
                "account_id": contract_id,
                "method_name": method,
                "args_base64": STANDARD.encode(args.to_string()),
            }))
            .await?;
        let view: CallFunctionView = serde_json::from_value(result).map_err(|error| {
            NetworkFailure::transport(format!("unreadable {method} result: {error}"))
        })?;
        Ok(decode_return_value(&view.result))
    }

    async fn function_call(&self, call: FunctionCall) -> Result<CallOutcome, NetworkFailure> {
        let access = self.access_key().await?;
        let signed = self
            .build_transaction(&call, access)
            .and_then(|transaction| transaction.sign(&self.key))
            .map_err(|error| NetworkFailure::transport(error.to_string()))?;
        let envelope =
            signed.to_base64().map_err(|error| NetworkFailure::transport(error.to_string()))?;

        let result = self.rpc.call_required(BROADCAST_TX_COMMIT_METHOD, [envelope]).await?;
        let outcome = parse_transaction_result(result)?;
        info!(
            event_name = "near.transaction_committed",
            contract_id = %call.contract_id,
            method = %call.method,
            transaction_hash = %outcome.transaction_hash,
            "transaction committed"
        );
        Ok(outcome)
    }
}

/// View and call results are raw bytes; JSON when the contract returns JSON.
fn decode_return_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn parse_transaction_result(result: Value) -> Result<CallOutcome, NetworkFailure> {
    let result: TransactionResult = serde_json::from_value(result).map_err(|error| {
        NetworkFailure::transport(format!("unreadable transaction outcome: {error}"))
    })?;
    let hash = result.transaction.hash;

    if let Some(failure) = result.status.get("Failure") {
        return Err(NetworkFailure::rejected(format!("transaction {hash} failed: {failure}")));
    }
    let value = match result.status.get("SuccessValue").and_then(Value::as_str) {
        Some(encoded) => {
            let bytes = STANDARD.decode(encoded).map_err(|error| {
                NetworkFailure::transport(format!("undecodable return value: {error}"))
            })?;
            Some(decode_return_value(&bytes)).filter(|value| !value.is_null())
        }
        None => None,
    };

    Ok(CallOutcome { transaction_hash: hash, value })
}
