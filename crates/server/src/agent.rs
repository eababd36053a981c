use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use intentdesk_agent::runtime::{report_payload, AgentRuntime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct AgentState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommandBody {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    pub account_id: String,
    pub balance: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/agent/command", post(agent_command))
        .route("/agent/status", get(agent_status))
        .with_state(AgentState { runtime })
}

async fn agent_command(
    State(state): State<AgentState>,
    Json(body): Json<CommandBody>,
) -> ApiResult<Value> {
    let command = body.command.as_deref().map(str::trim).unwrap_or_default();
    if command.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "Missing 'command' parameter".to_string(),
                correlation_id: None,
            }),
        ));
    }

    let report = state.runtime.handle_command(command, body.channel.as_deref()).await;
    Ok(Json(report_payload(&report)))
}

async fn agent_status(State(state): State<AgentState>) -> ApiResult<StatusBody> {
    match state.runtime.service().status().await {
        Ok(status) => {
            Ok(Json(StatusBody { account_id: status.account_id, balance: status.balance }))
        }
        Err(error) => {
            let correlation_id = Uuid::new_v4().to_string();
            warn!(
                event_name = "agent.status_failed",
                correlation_id = %correlation_id,
                error_kind = error.kind(),
                error = %error,
                "status query failed"
            );
            let interface = error.into_interface(correlation_id.clone());
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError {
                    error: interface.user_message().to_string(),
                    correlation_id: Some(correlation_id),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use intentdesk_agent::conversation::KeywordInterpreter;
    use intentdesk_agent::guardrails::GuardrailPolicy;
    use intentdesk_agent::runtime::AgentRuntime;
    use intentdesk_core::assets::AssetRegistry;
    use intentdesk_core::negotiation::InMemorySolverBus;
    use intentdesk_core::network::InMemoryNetwork;
    use intentdesk_core::orchestrator::{IntentOrchestrator, OrchestratorConfig};
    use intentdesk_core::signer::KeyMaterial;
    use intentdesk_core::MinorUnits;

    use super::{agent_command, agent_status, AgentState, CommandBody};

    const ONE_NEAR: u128 = 1_000_000_000_000_000_000_000_000;

    fn state(network: InMemoryNetwork) -> State<AgentState> {
        let registry = Arc::new(AssetRegistry::default());
        let orchestrator = IntentOrchestrator::new(
            registry.clone(),
            Arc::new(KeyMaterial::from_seed("alice.near", [5; 32])),
            OrchestratorConfig::default(),
            InMemorySolverBus::default(),
            network,
        );
        State(AgentState {
            runtime: Arc::new(AgentRuntime::new(
                Arc::new(KeywordInterpreter),
                GuardrailPolicy::default(),
                registry,
                Arc::new(orchestrator),
            )),
        })
    }

    fn funded() -> InMemoryNetwork {
        let balance = MinorUnits(2 * ONE_NEAR + ONE_NEAR / 4);
        InMemoryNetwork::default().with_balance("alice.near", balance)
    }

    #[tokio::test]
    async fn missing_command_is_a_bad_request() {
        let result = agent_command(state(funded()), Json(CommandBody::default())).await;

        let (status, Json(error)) = result.expect_err("must reject");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "Missing 'command' parameter");
    }

    #[tokio::test]
    async fn command_returns_transcript_output() {
        let body = CommandBody { command: Some("status".to_string()), channel: Some("web".into()) };

        let Json(payload) = agent_command(state(funded()), Json(body)).await.expect("handled");

        assert_eq!(payload["status"], "OK");
        assert_eq!(payload["result"], "completed");
        let output = payload["output"].as_str().unwrap_or_default();
        assert!(output.starts_with("Processing command: status\n"));
        assert!(output.contains("balance: 2.25 NEAR"));
    }

    #[tokio::test]
    async fn status_reports_account_and_balance() {
        let Json(body) = agent_status(state(funded())).await.expect("status");

        assert_eq!(body.account_id, "alice.near");
        assert_eq!(body.balance, "2.25");
    }

    #[tokio::test]
    async fn status_failure_hides_internal_detail() {
        let result = agent_status(state(InMemoryNetwork::default())).await;

        let (status, Json(error)) = result.expect_err("unknown account");
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!error.error.contains("alice.near"));
        assert!(error.correlation_id.is_some());
    }
}
