use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::amount::{format_minor_units, Amount, MinorUnits};
use crate::assets::{AssetDescriptor, AssetRegistry};
use crate::config::{
    IntentsConfig, DEFAULT_GAS_LIMIT, DEFAULT_STORAGE_DEPOSIT, DEFAULT_VERIFYING_CONTRACT,
};
use crate::domain::intent::{
    Commitment, Deadline, Intent, PublishIntent, Quote, QuoteOption, SignedIntents,
};
use crate::domain::request::{IntentRequest, QuoteRequest};
use crate::errors::IntentError;
use crate::flows::{DepositFlow, FlowState, FlowTracker, SwapFlow, WithdrawFlow};
use crate::negotiation::{committed_amount_in, QuoteNegotiator, SelectionPolicy, SolverBus};
use crate::network::{
    CallOutcome, FunctionCall, RegistrationOutcome, SettlementNetwork, StorageRegistrar,
    ONE_YOCTO,
};
use crate::progress::{
    Operation, ProgressEvent, ProgressOutcome, ProgressSink, TracingProgressSink,
};
use crate::signer::{sign_payload, KeyMaterial};

pub const FT_BALANCE_OF: &str = "ft_balance_of";
pub const FT_TRANSFER_CALL: &str = "ft_transfer_call";
pub const NEAR_DEPOSIT: &str = "near_deposit";
pub const EXECUTE_INTENTS: &str = "execute_intents";
pub const WITHDRAW_MEMO_PREFIX: &str = "WITHDRAW_TO:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub verifying_contract: String,
    pub gas_limit: u64,
    pub storage_deposit: MinorUnits,
    pub quote_validity_ms: u64,
    pub min_deadline_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            verifying_contract: DEFAULT_VERIFYING_CONTRACT.to_string(),
            gas_limit: DEFAULT_GAS_LIMIT,
            storage_deposit: DEFAULT_STORAGE_DEPOSIT,
            quote_validity_ms: 120_000,
            min_deadline_ms: 60_000,
        }
    }
}

impl From<&IntentsConfig> for OrchestratorConfig {
    fn from(intents: &IntentsConfig) -> Self {
        Self {
            verifying_contract: intents.verifying_contract.clone(),
            gas_limit: intents.gas_limit,
            storage_deposit: intents.storage_deposit_yocto,
            quote_validity_ms: intents.quote_validity_ms,
            min_deadline_ms: intents.min_deadline_ms,
        }
    }
}

impl OrchestratorConfig {
    /// Signed quotes always outlive the minimum deadline by at least a second.
    pub fn validity_window_ms(&self) -> u64 {
        self.quote_validity_ms.max(self.min_deadline_ms.saturating_add(1_000))
    }
}

/// Per-invocation plumbing: correlation id, progress sink and cancellation.
#[derive(Clone)]
pub struct OperationContext {
    pub correlation_id: String,
    pub sink: Arc<dyn ProgressSink>,
    pub cancellation: CancellationToken,
}

impl OperationContext {
    pub fn new(correlation_id: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            sink,
            cancellation: CancellationToken::new(),
        }
    }

    /// Fresh correlation id, progress goes to the log only.
    pub fn detached() -> Self {
        Self::new(Uuid::new_v4().to_string(), Arc::new(TracingProgressSink))
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn ensure_active(&self, step: &str) -> Result<(), IntentError> {
        if self.cancellation.is_cancelled() {
            return Err(IntentError::Cancelled(step.to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapRequest {
    pub asset_in: String,
    pub amount_in: Decimal,
    pub asset_out: String,
    /// Pins the output amount; `None` asks for the best price.
    pub amount_out: Option<Decimal>,
}

impl SwapRequest {
    pub fn new(
        asset_in: impl Into<String>,
        amount_in: Decimal,
        asset_out: impl Into<String>,
    ) -> Self {
        Self {
            asset_in: asset_in.into(),
            amount_in,
            asset_out: asset_out.into(),
            amount_out: None,
        }
    }

    pub fn with_amount_out(mut self, amount_out: Decimal) -> Self {
        self.amount_out = Some(amount_out);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SwapReceipt {
    pub correlation_id: String,
    pub request: QuoteRequest,
    pub selected: QuoteOption,
    pub quote: Quote,
    pub published: PublishIntent,
    pub response: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Unavailability {
    pub correlation_id: String,
    pub request: QuoteRequest,
    #[serde(serialize_with = "serialize_error_kind")]
    pub reason: IntentError,
}

fn serialize_error_kind<S: serde::Serializer>(
    error: &IntentError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(error.kind())
}

/// "No market right now" is a regular outcome, not an error.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SwapOutcome {
    Published(Box<SwapReceipt>),
    Unavailable(Unavailability),
}

impl SwapOutcome {
    pub fn into_result(self) -> Result<SwapReceipt, IntentError> {
        match self {
            Self::Published(receipt) => Ok(*receipt),
            Self::Unavailable(unavailable) => Err(unavailable.reason),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositRequest {
    pub asset: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DepositReceipt {
    pub correlation_id: String,
    pub asset: String,
    pub amount: MinorUnits,
    pub storage: RegistrationOutcome,
    pub transactions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WithdrawDestination {
    /// An account on the settlement network itself.
    Near { receiver_id: String },
    /// An address on another chain, reached through the asset's custody contract.
    Foreign { network: String, address: String },
}

impl WithdrawDestination {
    /// `None`, blank or `near` keep the funds on NEAR; any other network name
    /// is a foreign chain.
    pub fn for_network(receiver: String, network: Option<String>) -> Self {
        match network.map(|network| network.trim().to_ascii_lowercase()) {
            Some(network) if !network.is_empty() && network != "near" => {
                Self::Foreign { network, address: receiver }
            }
            _ => Self::Near { receiver_id: receiver },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementRoute {
    #[default]
    SolverBus,
    OnChain,
}

impl SettlementRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SolverBus => "solver_bus",
            Self::OnChain => "on_chain",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub asset: String,
    pub amount: Decimal,
    pub destination: WithdrawDestination,
    pub route: SettlementRoute,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WithdrawReceipt {
    pub correlation_id: String,
    pub quote: Quote,
    pub commitment: Commitment,
    pub route: SettlementRoute,
    pub response: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub account_id: String,
    /// Whole native units, exact.
    pub balance: String,
    pub balance_minor: MinorUnits,
}

pub struct IntentOrchestrator<B, N> {
    registry: Arc<AssetRegistry>,
    key: Arc<KeyMaterial>,
    config: OrchestratorConfig,
    negotiator: QuoteNegotiator<B>,
    network: N,
}

impl<B, N> IntentOrchestrator<B, N>
where
    B: SolverBus,
    N: SettlementNetwork,
{
    pub fn new(
        registry: Arc<AssetRegistry>,
        key: Arc<KeyMaterial>,
        config: OrchestratorConfig,
        bus: B,
        network: N,
    ) -> Self {
        Self { registry, key, config, negotiator: QuoteNegotiator::new(bus), network }
    }

    pub fn account_id(&self) -> &str {
        self.key.account_id()
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn registrar(&self) -> StorageRegistrar<'_, N> {
        StorageRegistrar::new(
            &self.network,
            &self.config.verifying_contract,
            self.config.gas_limit,
            self.config.storage_deposit,
        )
    }

    pub async fn swap(
        &self,
        request: SwapRequest,
        ctx: &OperationContext,
    ) -> Result<SwapOutcome, IntentError> {
        info!(
            event_name = "swap.started",
            correlation_id = %ctx.correlation_id,
            asset_in = %request.asset_in,
            amount_in = %request.amount_in,
            asset_out = %request.asset_out,
            "starting swap"
        );
        let mut flow = FlowTracker::new(SwapFlow, ctx.correlation_id.clone(), ctx.sink.as_ref());
        match self.run_swap(&request, ctx, &mut flow).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(flow.fail(error)),
        }
    }

    async fn run_swap(
        &self,
        request: &SwapRequest,
        ctx: &OperationContext,
        flow: &mut FlowTracker<'_, SwapFlow>,
    ) -> Result<SwapOutcome, IntentError> {
        let asset_in = self.registry.resolve(&request.asset_in)?;
        let amount_in = Amount::positive(asset_in, request.amount_in)?;
        let available = self.check_balance(&amount_in).await?;
        flow.advance_with(FlowState::PreconditionsChecked, |event| {
            event.with_metadata("available", format_minor_units(available, asset_in.decimals))
        })?;

        let intent_request = IntentRequest::builder(&self.registry, self.config.min_deadline_ms)
            .with_asset_in(&request.asset_in, request.amount_in)?
            .with_asset_out(&request.asset_out, request.amount_out)?
            .build()?;
        let wire = intent_request.to_wire();
        flow.advance_with(FlowState::RequestBuilt, |event| event.with_payload("request", &wire))?;

        ctx.ensure_active("quote request")?;
        let options = self.negotiator.fetch_options(&intent_request).await?;
        if options.is_empty() {
            return Ok(self.unavailable(flow, ctx, wire, IntentError::NoLiquidity));
        }
        flow.advance_with(FlowState::OptionsFetched, |event| {
            event
                .with_metadata("option_count", options.len().to_string())
                .with_payload("options", &options)
        })?;

        let policy = SelectionPolicy::for_request(&intent_request);
        let selected = match self.negotiator.select(&intent_request, &options) {
            Some(option) => option.clone(),
            None => return Ok(self.unavailable(flow, ctx, wire, IntentError::NoViableOption)),
        };
        let Some(amount_out) = selected.amount_out_units().filter(|units| !units.is_zero()) else {
            return Ok(self.unavailable(flow, ctx, wire, IntentError::NoViableOption));
        };
        let committed_in = committed_amount_in(&intent_request, &selected);
        flow.advance_with(FlowState::OptionSelected, |event| {
            event
                .with_metadata("policy", policy.as_str())
                .with_metadata("amount_in", committed_in.to_string())
                .with_payload("option", &selected)
        })?;

        ctx.ensure_active("signing")?;
        let registrar = self.registrar();
        for asset in [&intent_request.asset_in.asset, &intent_request.asset_out] {
            registrar.ensure_storage(asset, self.account_id()).await?;
        }
        let intent = Intent::token_diff(
            &intent_request.asset_in.asset.asset_id,
            committed_in,
            &intent_request.asset_out.asset_id,
            amount_out,
        );
        let (quote, commitment) = self.sign_intents(vec![intent])?;
        flow.advance_with(FlowState::QuoteSigned, |event| {
            event
                .with_metadata("nonce", quote.nonce.to_string())
                .with_metadata("deadline", quote.deadline.to_string())
                .with_payload("quote", &quote)
        })?;

        ctx.ensure_active("publish")?;
        let published = PublishIntent {
            signed_data: commitment,
            quote_hashes: vec![selected.quote_hash.clone()],
        };
        let response = self.negotiator.publish(&published).await?;
        flow.advance_with(FlowState::Published, |event| event.with_payload("response", &response))?;
        flow.advance(FlowState::Done)?;

        info!(
            event_name = "swap.published",
            correlation_id = %ctx.correlation_id,
            quote_hash = %selected.quote_hash,
            "swap intent published"
        );
        Ok(SwapOutcome::Published(Box::new(SwapReceipt {
            correlation_id: ctx.correlation_id.clone(),
            request: wire,
            selected,
            quote,
            published,
            response,
        })))
    }

    fn unavailable(
        &self,
        flow: &mut FlowTracker<'_, SwapFlow>,
        ctx: &OperationContext,
        request: QuoteRequest,
        reason: IntentError,
    ) -> SwapOutcome {
        info!(
            event_name = "swap.unavailable",
            correlation_id = %ctx.correlation_id,
            reason = reason.kind(),
            "no market for swap"
        );
        flow.unavailable(&reason);
        SwapOutcome::Unavailable(Unavailability {
            correlation_id: ctx.correlation_id.clone(),
            request,
            reason,
        })
    }

    fn sign_intents(&self, intents: Vec<Intent>) -> Result<(Quote, Commitment), IntentError> {
        let quote = Quote::new(
            self.account_id(),
            self.config.verifying_contract.clone(),
            Deadline::from_now(self.config.validity_window_ms()),
            intents,
        );
        let commitment = sign_payload(quote.to_payload()?, &self.key);
        Ok((quote, commitment))
    }

    pub async fn deposit(
        &self,
        request: DepositRequest,
        ctx: &OperationContext,
    ) -> Result<DepositReceipt, IntentError> {
        info!(
            event_name = "deposit.started",
            correlation_id = %ctx.correlation_id,
            asset = %request.asset,
            amount = %request.amount,
            "starting deposit"
        );
        let asset = self.registry.resolve(&request.asset)?.clone();
        let mut flow = FlowTracker::new(
            DepositFlow { native: asset.is_native() },
            ctx.correlation_id.clone(),
            ctx.sink.as_ref(),
        );
        match self.run_deposit(&asset, request.amount, ctx, &mut flow).await {
            Ok(receipt) => Ok(receipt),
            Err(error) => Err(flow.fail(error)),
        }
    }

    async fn run_deposit(
        &self,
        asset: &AssetDescriptor,
        amount: Decimal,
        ctx: &OperationContext,
        flow: &mut FlowTracker<'_, DepositFlow>,
    ) -> Result<DepositReceipt, IntentError> {
        let amount = Amount::positive(asset, amount)?;
        let available = self.check_balance(&amount).await?;
        flow.advance_with(FlowState::PreconditionsChecked, |event| {
            event.with_metadata("available", format_minor_units(available, asset.decimals))
        })?;

        ctx.ensure_active("storage registration")?;
        let storage =
            self.registrar().ensure_storage(asset, &self.config.verifying_contract).await?;
        flow.advance_with(FlowState::StorageRegistered, |event| {
            event.with_metadata("detail", storage.as_str())
        })?;

        let mut transactions = Vec::new();
        if asset.is_native() {
            ctx.ensure_active("wrap")?;
            let wrapped = self
                .network
                .function_call(
                    FunctionCall::new(asset.contract_id.clone(), NEAR_DEPOSIT, json!({}))
                        .with_gas(self.config.gas_limit)
                        .with_deposit(amount.units),
                )
                .await?;
            flow.advance_with(FlowState::Wrapped, |event| {
                event.with_metadata("transaction_hash", wrapped.transaction_hash.clone())
            })?;
            transactions.push(wrapped.transaction_hash);
        }

        ctx.ensure_active("transfer")?;
        let transfer = self
            .network
            .function_call(
                FunctionCall::new(
                    asset.contract_id.clone(),
                    FT_TRANSFER_CALL,
                    json!({
                        "receiver_id": self.config.verifying_contract,
                        "amount": amount.units,
                        "msg": "",
                    }),
                )
                .with_gas(self.config.gas_limit)
                .with_deposit(ONE_YOCTO),
            )
            .await?;
        flow.advance_with(FlowState::Transferred, |event| {
            event.with_metadata("transaction_hash", transfer.transaction_hash.clone())
        })?;
        transactions.push(transfer.transaction_hash);
        flow.advance(FlowState::Done)?;

        Ok(DepositReceipt {
            correlation_id: ctx.correlation_id.clone(),
            asset: asset.symbol.clone(),
            amount: amount.units,
            storage,
            transactions,
        })
    }

    pub async fn withdraw(
        &self,
        request: WithdrawRequest,
        ctx: &OperationContext,
    ) -> Result<WithdrawReceipt, IntentError> {
        info!(
            event_name = "withdraw.started",
            correlation_id = %ctx.correlation_id,
            asset = %request.asset,
            amount = %request.amount,
            "starting withdrawal"
        );
        let mut flow =
            FlowTracker::new(WithdrawFlow, ctx.correlation_id.clone(), ctx.sink.as_ref());
        match self.run_withdraw(&request, ctx, &mut flow).await {
            Ok(receipt) => Ok(receipt),
            Err(error) => Err(flow.fail(error)),
        }
    }

    async fn run_withdraw(
        &self,
        request: &WithdrawRequest,
        ctx: &OperationContext,
        flow: &mut FlowTracker<'_, WithdrawFlow>,
    ) -> Result<WithdrawReceipt, IntentError> {
        let asset = self.registry.resolve(&request.asset)?;
        let amount = Amount::positive(asset, request.amount)?;
        let intent = withdraw_intent(asset, amount.units, &request.destination)?;
        flow.advance_with(FlowState::PreconditionsChecked, |event| {
            event.with_payload("intent", &intent)
        })?;

        let (quote, commitment) = self.sign_intents(vec![intent])?;
        flow.advance_with(FlowState::QuoteSigned, |event| {
            event.with_metadata("nonce", quote.nonce.to_string()).with_payload("quote", &quote)
        })?;

        ctx.ensure_active("publish")?;
        let response = match request.route {
            SettlementRoute::SolverBus => {
                let published =
                    PublishIntent { signed_data: commitment.clone(), quote_hashes: Vec::new() };
                self.negotiator.publish(&published).await?
            }
            SettlementRoute::OnChain => {
                let outcome = self.submit_intents(vec![commitment.clone()]).await?;
                serde_json::to_value(outcome)?
            }
        };
        flow.advance_with(FlowState::Published, |event| {
            event
                .with_metadata("route", request.route.as_str())
                .with_payload("response", &response)
        })?;
        flow.advance(FlowState::Done)?;

        Ok(WithdrawReceipt {
            correlation_id: ctx.correlation_id.clone(),
            quote,
            commitment,
            route: request.route,
            response,
        })
    }

    /// Settles signed commitments directly on the verifying contract.
    pub async fn execute_intents(
        &self,
        commitments: Vec<Commitment>,
        ctx: &OperationContext,
    ) -> Result<CallOutcome, IntentError> {
        ctx.ensure_active("execute_intents")?;
        let count = commitments.len();
        let outcome = self.submit_intents(commitments).await;
        let event = match &outcome {
            Ok(call) => ProgressEvent::new(
                ctx.correlation_id.clone(),
                Operation::Withdraw,
                "execute_intents.submitted",
                "Published",
                ProgressOutcome::Success,
            )
            .with_metadata("transaction_hash", call.transaction_hash.clone()),
            Err(error) => ProgressEvent::new(
                ctx.correlation_id.clone(),
                Operation::Withdraw,
                "execute_intents.failed",
                "Failed",
                ProgressOutcome::Failed,
            )
            .with_metadata("error_kind", error.kind())
            .with_metadata("error", error.to_string()),
        };
        ctx.sink.emit(event.with_metadata("commitments", count.to_string()));
        outcome
    }

    async fn submit_intents(
        &self,
        commitments: Vec<Commitment>,
    ) -> Result<CallOutcome, IntentError> {
        let args = serde_json::to_value(SignedIntents { signed: commitments })?;
        let call = FunctionCall::new(self.config.verifying_contract.clone(), EXECUTE_INTENTS, args)
            .with_gas(self.config.gas_limit);
        Ok(self.network.function_call(call).await?)
    }

    /// Registers the signing key with the settlement contract; a key that is
    /// already registered counts as success.
    pub async fn register_public_key(
        &self,
        ctx: &OperationContext,
    ) -> Result<RegistrationOutcome, IntentError> {
        ctx.ensure_active("public key registration")?;
        let public_key = self.key.public_key();
        let result = self.registrar().register_public_key(&public_key).await;
        let event = match &result {
            Ok(outcome) => ProgressEvent::new(
                ctx.correlation_id.clone(),
                Operation::RegisterKey,
                format!("register_key.{}", outcome.as_str()),
                "Done",
                ProgressOutcome::Success,
            ),
            Err(error) => ProgressEvent::new(
                ctx.correlation_id.clone(),
                Operation::RegisterKey,
                "register_key.failed",
                "Failed",
                ProgressOutcome::Failed,
            )
            .with_metadata("error_kind", error.kind())
            .with_metadata("error", error.to_string()),
        };
        ctx.sink.emit(event.with_metadata("public_key", public_key));
        result
    }

    pub async fn status(&self) -> Result<AccountStatus, IntentError> {
        let native = self.registry.native()?;
        let view = self.network.view_account(self.account_id()).await?;
        Ok(AccountStatus {
            account_id: self.account_id().to_string(),
            balance: format_minor_units(view.amount, native.decimals),
            balance_minor: view.amount,
        })
    }

    /// Wallet balance of `asset` for the signing account.
    pub async fn balance_of(&self, asset: &AssetDescriptor) -> Result<MinorUnits, IntentError> {
        if asset.is_native() {
            return Ok(self.network.view_account(self.account_id()).await?.amount);
        }

        let args = json!({ "account_id": self.account_id() });
        let value = self.network.view_function(&asset.contract_id, FT_BALANCE_OF, &args).await?;
        match value {
            Value::String(raw) => raw.parse(),
            Value::Null => Ok(MinorUnits::ZERO),
            other => Err(IntentError::Serialization(format!(
                "{FT_BALANCE_OF} on {} returned {other}",
                asset.contract_id
            ))),
        }
    }

    /// Advisory only: the balance can change before settlement, and the
    /// network's own rejection remains the authoritative check.
    async fn check_balance(&self, amount: &Amount) -> Result<MinorUnits, IntentError> {
        let available = self.balance_of(&amount.asset).await?;
        if available < amount.units {
            return Err(IntentError::InsufficientBalance {
                required: amount.to_string(),
                available: format!(
                    "{} {}",
                    format_minor_units(available, amount.asset.decimals),
                    amount.asset.symbol
                ),
            });
        }
        Ok(available)
    }
}

fn withdraw_intent(
    asset: &AssetDescriptor,
    amount: MinorUnits,
    destination: &WithdrawDestination,
) -> Result<Intent, IntentError> {
    match destination {
        WithdrawDestination::Near { receiver_id } => {
            if receiver_id.trim().is_empty() {
                return Err(IntentError::IncompleteRequest("withdrawal receiver is empty".into()));
            }
            Ok(Intent::FtWithdraw {
                token: asset.contract_id.clone(),
                receiver_id: receiver_id.clone(),
                amount,
                memo: None,
            })
        }
        WithdrawDestination::Foreign { network, address } => {
            if address.trim().is_empty() {
                return Err(IntentError::IncompleteRequest(format!(
                    "withdrawal address on {network} is empty"
                )));
            }
            let custody = asset.bridged_contract_id.clone().ok_or_else(|| {
                IntentError::IncompleteRequest(format!(
                    "{} has no cross-chain custody contract for {network}",
                    asset.symbol
                ))
            })?;
            Ok(Intent::FtWithdraw {
                token: custody.clone(),
                receiver_id: custody,
                amount,
                memo: Some(format!("{WITHDRAW_MEMO_PREFIX}{address}")),
            })
        }
    }
}
