pub mod amount;
pub mod assets;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod negotiation;
pub mod network;
pub mod orchestrator;
pub mod progress;
pub mod signer;

pub use amount::{format_minor_units, from_minor_units, to_minor_units, Amount, MinorUnits};
pub use assets::{AssetDescriptor, AssetRegistry};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::intent::{
    Commitment, Deadline, Intent, Nonce, PublishIntent, Quote, QuoteOption, SignedIntents,
};
pub use domain::request::{IntentRequest, IntentRequestBuilder, QuoteRequest};
pub use errors::{IntentError, InterfaceError};
pub use flows::{FlowState, FlowTracker};
pub use negotiation::{InMemorySolverBus, QuoteNegotiator, SelectionPolicy, SolverBus};
pub use network::{
    AccountView, CallOutcome, FailureKind, FunctionCall, InMemoryNetwork, NetworkFailure,
    RegistrationOutcome, SettlementNetwork, StorageRegistrar,
};
pub use orchestrator::{
    AccountStatus, DepositReceipt, DepositRequest, IntentOrchestrator, OperationContext,
    OrchestratorConfig, SettlementRoute, SwapOutcome, SwapReceipt, SwapRequest, Unavailability,
    WithdrawDestination, WithdrawReceipt, WithdrawRequest,
};
pub use progress::{
    FanoutProgressSink, InMemoryProgressSink, Operation, ProgressEvent, ProgressOutcome,
    ProgressSink, TracingProgressSink,
};
pub use signer::{sign_payload, verify_commitment, AccountCredentials, KeyMaterial};
