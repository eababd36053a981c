pub mod config;
pub mod deposit;
pub mod doctor;
pub mod register_key;
pub mod status;
pub mod swap;
pub mod withdraw;

use std::sync::Arc;

use intentdesk_core::assets::AssetRegistry;
use intentdesk_core::config::{AppConfig, LoadOptions};
use intentdesk_core::errors::IntentError;
use intentdesk_core::orchestrator::{IntentOrchestrator, OperationContext, OrchestratorConfig};
use intentdesk_core::progress::InMemoryProgressSink;
use intentdesk_core::signer::AccountCredentials;
use intentdesk_rpc::{NearRpcClient, SolverBusClient};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use uuid::Uuid;

pub type LiveOrchestrator = IntentOrchestrator<SolverBusClient, NearRpcClient>;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok_payload(command, "ok", None, message.into(), None)
    }

    pub fn success_with<T: Serialize>(command: &str, message: impl Into<String>, data: &T) -> Self {
        let data = serde_json::to_value(data).ok();
        Self::ok_payload(command, "ok", None, message.into(), data)
    }

    /// No market right now. Not a failure, so the exit code stays zero.
    pub fn unavailable(command: &str, reason: &IntentError) -> Self {
        Self::ok_payload(command, "unavailable", Some(reason.kind()), reason.to_string(), None)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn operation_failure(command: &str, error: &IntentError) -> Self {
        let exit_code = if error.is_precondition() { 6 } else { 7 };
        Self::failure(command, error.kind(), error.to_string(), exit_code)
    }

    fn ok_payload(
        command: &str,
        status: &str,
        error_class: Option<&str>,
        message: String,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: status.to_string(),
            error_class: error_class.map(str::to_string),
            message,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Everything a network-facing command needs: a current-thread runtime and
/// an orchestrator wired to the configured transports.
pub(crate) struct Session {
    pub runtime: Runtime,
    pub orchestrator: LiveOrchestrator,
}

pub(crate) fn open_session(command: &str) -> Result<Session, CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;
    let credentials_path = config.require_credentials_file().map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), 2)
    })?;
    let key = AccountCredentials::load(credentials_path)
        .and_then(AccountCredentials::into_key_material)
        .map_err(|error| CommandResult::failure(command, "credentials", error.to_string(), 4))?;
    let key = Arc::new(key);

    let network = NearRpcClient::from_config(&config.network, key.clone())
        .map_err(|error| CommandResult::failure(command, "transport_setup", error.to_string(), 5))?;
    let bus = SolverBusClient::from_config(&config.solver_bus)
        .map_err(|error| CommandResult::failure(command, "transport_setup", error.to_string(), 5))?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    let orchestrator = IntentOrchestrator::new(
        Arc::new(AssetRegistry::with_overrides(config.assets.clone())),
        key,
        OrchestratorConfig::from(&config.intents),
        bus,
        network,
    );
    Ok(Session { runtime, orchestrator })
}

/// Fresh correlation id with progress collected for the command output.
pub(crate) fn operation_context() -> (OperationContext, Arc<InMemoryProgressSink>) {
    let sink = Arc::new(InMemoryProgressSink::default());
    let ctx = OperationContext::new(Uuid::new_v4().to_string(), sink.clone());
    (ctx, sink)
}

pub(crate) fn progress_lines(sink: &InMemoryProgressSink) -> Vec<String> {
    sink.events().iter().map(|event| event.summary()).collect()
}
