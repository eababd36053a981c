use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::amount::MinorUnits;
use crate::assets::AssetDescriptor;
use crate::errors::IntentError;

pub const STORAGE_BALANCE_OF: &str = "storage_balance_of";
pub const STORAGE_DEPOSIT: &str = "storage_deposit";
pub const ADD_PUBLIC_KEY: &str = "add_public_key";
pub const ONE_YOCTO: MinorUnits = MinorUnits(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Timeout,
    /// The node or contract processed the call and refused it.
    Rejected,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NetworkFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl NetworkFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transport, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Timeout, message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Rejected, message: message.into() }
    }
}

impl From<NetworkFailure> for IntentError {
    fn from(failure: NetworkFailure) -> Self {
        match failure.kind {
            FailureKind::Transport => Self::TransportError(failure.message),
            FailureKind::Timeout => Self::Timeout(failure.message),
            FailureKind::Rejected => Self::SettlementRejected(failure.message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub amount: MinorUnits,
    #[serde(default)]
    pub locked: MinorUnits,
    #[serde(default)]
    pub storage_usage: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCall {
    pub contract_id: String,
    pub method: String,
    pub args: Value,
    pub gas: u64,
    pub deposit: MinorUnits,
}

impl FunctionCall {
    pub fn new(contract_id: impl Into<String>, method: impl Into<String>, args: Value) -> Self {
        Self {
            contract_id: contract_id.into(),
            method: method.into(),
            args,
            gas: 0,
            deposit: MinorUnits::ZERO,
        }
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_deposit(mut self, deposit: MinorUnits) -> Self {
        self.deposit = deposit;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallOutcome {
    pub transaction_hash: String,
    /// Decoded JSON return value, when the method returned one.
    pub value: Option<Value>,
}

/// Account and transaction access to the settlement network.
#[async_trait]
pub trait SettlementNetwork: Send + Sync {
    async fn view_account(&self, account_id: &str) -> Result<AccountView, NetworkFailure>;

    async fn view_function(
        &self,
        contract_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<Value, NetworkFailure>;

    /// Signs and submits a transaction carrying one function-call action.
    async fn function_call(&self, call: FunctionCall) -> Result<CallOutcome, NetworkFailure>;
}

#[async_trait]
impl<T> SettlementNetwork for Arc<T>
where
    T: SettlementNetwork + ?Sized,
{
    async fn view_account(&self, account_id: &str) -> Result<AccountView, NetworkFailure> {
        (**self).view_account(account_id).await
    }

    async fn view_function(
        &self,
        contract_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<Value, NetworkFailure> {
        (**self).view_function(contract_id, method, args).await
    }

    async fn function_call(&self, call: FunctionCall) -> Result<CallOutcome, NetworkFailure> {
        (**self).function_call(call).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered,
    AlreadyRegistered,
}

impl RegistrationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::AlreadyRegistered => "already_registered",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationFailure {
    AlreadyRegistered,
    Other,
}

/// Contracts only report duplicate registration as free text, so this is the
/// one place that inspects the message. Matching is case-insensitive.
/// Known fragility: a contract that rewords its error breaks idempotency.
pub fn classify_registration_failure(message: &str) -> RegistrationFailure {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("already registered") || lowered.contains("already exists") {
        RegistrationFailure::AlreadyRegistered
    } else {
        RegistrationFailure::Other
    }
}

fn registration_result(failure: NetworkFailure) -> Result<RegistrationOutcome, IntentError> {
    match (classify_registration_failure(&failure.message), failure.kind) {
        (RegistrationFailure::AlreadyRegistered, _) => Ok(RegistrationOutcome::AlreadyRegistered),
        (RegistrationFailure::Other, FailureKind::Rejected) => {
            Err(IntentError::RegistrationError(failure.message))
        }
        (RegistrationFailure::Other, _) => Err(failure.into()),
    }
}

/// Storage and public-key registration against token contracts and the
/// settlement contract.
pub struct StorageRegistrar<'n, N> {
    network: &'n N,
    verifying_contract: &'n str,
    gas: u64,
    storage_deposit: MinorUnits,
}

impl<'n, N> StorageRegistrar<'n, N>
where
    N: SettlementNetwork,
{
    pub fn new(
        network: &'n N,
        verifying_contract: &'n str,
        gas: u64,
        storage_deposit: MinorUnits,
    ) -> Self {
        Self { network, verifying_contract, gas, storage_deposit }
    }

    pub async fn is_registered(
        &self,
        asset: &AssetDescriptor,
        account_id: &str,
    ) -> Result<bool, IntentError> {
        let args = json!({ "account_id": account_id });
        let balance =
            self.network.view_function(&asset.contract_id, STORAGE_BALANCE_OF, &args).await?;
        Ok(!balance.is_null())
    }

    /// No-op when `account_id` already holds a storage balance on the asset's
    /// contract.
    pub async fn ensure_storage(
        &self,
        asset: &AssetDescriptor,
        account_id: &str,
    ) -> Result<RegistrationOutcome, IntentError> {
        if self.is_registered(asset, account_id).await? {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        info!(
            event_name = "registration.storage_deposit",
            asset = %asset.symbol,
            contract_id = %asset.contract_id,
            account_id,
            "registering token storage"
        );
        let call = FunctionCall::new(
            asset.contract_id.clone(),
            STORAGE_DEPOSIT,
            json!({ "account_id": account_id }),
        )
        .with_gas(self.gas)
        .with_deposit(self.storage_deposit);

        match self.network.function_call(call).await {
            Ok(_) => Ok(RegistrationOutcome::Registered),
            Err(failure) => registration_result(failure),
        }
    }

    pub async fn register_public_key(
        &self,
        public_key: &str,
    ) -> Result<RegistrationOutcome, IntentError> {
        let call = FunctionCall::new(
            self.verifying_contract,
            ADD_PUBLIC_KEY,
            json!({ "public_key": public_key }),
        )
        .with_gas(self.gas)
        .with_deposit(ONE_YOCTO);

        match self.network.function_call(call).await {
            Ok(_) => Ok(RegistrationOutcome::Registered),
            Err(failure) => registration_result(failure),
        }
    }
}

/// In-memory network for tests: balances and storage registrations live in a
/// shared table and every submitted call is recorded.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<InMemoryNetworkState>>,
}

#[derive(Default)]
struct InMemoryNetworkState {
    balances: Vec<(String, MinorUnits)>,
    token_balances: Vec<(String, String, MinorUnits)>,
    storage: Vec<(String, String)>,
    public_keys: Vec<String>,
    calls: Vec<FunctionCall>,
    failures: Vec<(String, NetworkFailure)>,
}

impl InMemoryNetwork {
    pub fn with_balance(self, account_id: &str, amount: MinorUnits) -> Self {
        self.with_state(|state| state.balances.push((account_id.to_string(), amount)));
        self
    }

    pub fn with_token_balance(self, contract_id: &str, account_id: &str, amount: MinorUnits) -> Self {
        self.with_state(|state| {
            state.token_balances.push((contract_id.to_string(), account_id.to_string(), amount));
        });
        self
    }

    pub fn with_storage(self, contract_id: &str, account_id: &str) -> Self {
        self.with_state(|state| {
            state.storage.push((contract_id.to_string(), account_id.to_string()));
        });
        self
    }

    /// Every call to `method` fails with `failure`.
    pub fn failing(self, method: &str, failure: NetworkFailure) -> Self {
        self.with_state(|state| state.failures.push((method.to_string(), failure)));
        self
    }

    pub fn calls(&self) -> Vec<FunctionCall> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn calls_to(&self, method: &str) -> Vec<FunctionCall> {
        self.calls().into_iter().filter(|call| call.method == method).collect()
    }

    fn with_state<R>(&self, apply: impl FnOnce(&mut InMemoryNetworkState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => apply(&mut state),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl SettlementNetwork for InMemoryNetwork {
    async fn view_account(&self, account_id: &str) -> Result<AccountView, NetworkFailure> {
        self.with_state(|state| {
            state
                .balances
                .iter()
                .find(|(owner, _)| owner == account_id)
                .map(|(_, amount)| AccountView {
                    amount: *amount,
                    locked: MinorUnits::ZERO,
                    storage_usage: 0,
                })
                .ok_or_else(|| NetworkFailure::rejected(format!("account {account_id} does not exist")))
        })
    }

    async fn view_function(
        &self,
        contract_id: &str,
        method: &str,
        args: &Value,
    ) -> Result<Value, NetworkFailure> {
        self.with_state(|state| {
            if let Some((_, failure)) = state.failures.iter().find(|(name, _)| name == method) {
                return Err(failure.clone());
            }
            let account_id = args.get("account_id").and_then(Value::as_str).unwrap_or_default();
            if method == "ft_balance_of" {
                let balance = state
                    .token_balances
                    .iter()
                    .find(|(contract, owner, _)| contract == contract_id && owner == account_id)
                    .map_or(MinorUnits::ZERO, |(_, _, amount)| *amount);
                return Ok(json!(balance));
            }
            let registered = state
                .storage
                .iter()
                .any(|(contract, account)| contract == contract_id && account == account_id);
            if registered {
                Ok(json!({ "total": "1250000000000000000000", "available": "0" }))
            } else {
                Ok(Value::Null)
            }
        })
    }

    async fn function_call(&self, call: FunctionCall) -> Result<CallOutcome, NetworkFailure> {
        self.with_state(|state| {
            state.calls.push(call.clone());
            if let Some((_, failure)) = state.failures.iter().find(|(name, _)| *name == call.method) {
                return Err(failure.clone());
            }

            match call.method.as_str() {
                STORAGE_DEPOSIT => {
                    let account_id =
                        call.args.get("account_id").and_then(Value::as_str).unwrap_or_default();
                    state.storage.push((call.contract_id.clone(), account_id.to_string()));
                }
                ADD_PUBLIC_KEY => {
                    let key = call.args.get("public_key").and_then(Value::as_str).unwrap_or_default();
                    if state.public_keys.iter().any(|existing| existing == key) {
                        return Err(NetworkFailure::rejected(
                            "Smart contract panicked: public key already exists",
                        ));
                    }
                    state.public_keys.push(key.to_string());
                }
                _ => {}
            }

            Ok(CallOutcome {
                transaction_hash: format!("tx-{}", state.calls.len()),
                value: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        classify_registration_failure, FailureKind, InMemoryNetwork, NetworkFailure,
        RegistrationFailure, RegistrationOutcome, StorageRegistrar, STORAGE_DEPOSIT,
    };
    use crate::amount::MinorUnits;
    use crate::assets::AssetRegistry;
    use crate::errors::IntentError;

    const DEPOSIT: MinorUnits = MinorUnits(1_250_000_000_000_000_000_000);

    #[test]
    fn classifier_is_case_insensitive() {
        for message in [
            "The account is already registered",
            "Smart contract panicked: Public Key Already Exists",
            "ALREADY REGISTERED",
        ] {
            assert_eq!(classify_registration_failure(message), RegistrationFailure::AlreadyRegistered);
        }
        assert_eq!(classify_registration_failure("not enough balance"), RegistrationFailure::Other);
    }

    #[test]
    fn network_failures_map_onto_the_taxonomy() {
        assert_eq!(
            IntentError::from(NetworkFailure::timeout("view_account after 5s")),
            IntentError::Timeout("view_account after 5s".to_string())
        );
        assert!(matches!(
            IntentError::from(NetworkFailure::rejected("Exceeded the prepaid gas")),
            IntentError::SettlementRejected(_)
        ));
        assert_eq!(NetworkFailure::transport("reset").kind, FailureKind::Transport);
    }

    #[tokio::test]
    async fn storage_registration_is_idempotent() {
        let registry = AssetRegistry::default();
        let usdc = registry.resolve("USDC").expect("usdc");
        let network = InMemoryNetwork::default();
        let registrar = StorageRegistrar::new(&network, "intents.near", 300_000_000_000_000, DEPOSIT);

        let first = registrar.ensure_storage(usdc, "alice.near").await.expect("first");
        let second = registrar.ensure_storage(usdc, "alice.near").await.expect("second");

        assert_eq!(first, RegistrationOutcome::Registered);
        assert_eq!(second, RegistrationOutcome::AlreadyRegistered);
        let deposits = network.calls_to(STORAGE_DEPOSIT);
        assert_eq!(deposits.len(), 1);
        assert_eq!(deposits[0].deposit, DEPOSIT);
        assert_eq!(deposits[0].args, json!({ "account_id": "alice.near" }));
    }

    #[tokio::test]
    async fn duplicate_public_key_is_success() {
        let network = InMemoryNetwork::default();
        let registrar = StorageRegistrar::new(&network, "intents.near", 300_000_000_000_000, DEPOSIT);

        let first = registrar.register_public_key("ed25519:abc").await.expect("first");
        let second = registrar.register_public_key("ed25519:abc").await.expect("second");

        assert_eq!(first, RegistrationOutcome::Registered);
        assert_eq!(second, RegistrationOutcome::AlreadyRegistered);
    }

    #[tokio::test]
    async fn other_rejections_propagate_as_registration_errors() {
        let registry = AssetRegistry::default();
        let zec = registry.resolve("ZCASH").expect("zcash");
        let network = InMemoryNetwork::default()
            .failing(STORAGE_DEPOSIT, NetworkFailure::rejected("attached deposit is too small"));
        let registrar = StorageRegistrar::new(&network, "intents.near", 300_000_000_000_000, DEPOSIT);

        let error = registrar.ensure_storage(zec, "alice.near").await.expect_err("rejected");
        assert!(matches!(error, IntentError::RegistrationError(ref message) if message.contains("too small")));
    }

    #[tokio::test]
    async fn transport_failures_keep_their_kind() {
        let registry = AssetRegistry::default();
        let zec = registry.resolve("ZCASH").expect("zcash");
        let network = InMemoryNetwork::default()
            .failing("storage_balance_of", NetworkFailure::timeout("query after 5s"));
        let registrar = StorageRegistrar::new(&network, "intents.near", 300_000_000_000_000, DEPOSIT);

        let error = registrar.ensure_storage(zec, "alice.near").await.expect_err("timeout");
        assert!(matches!(error, IntentError::Timeout(_)));
    }
}
