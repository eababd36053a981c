use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use intentdesk_agent::runtime::IntentService;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    service: Arc<dyn IntentService>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub network: HealthCheck,
    pub checked_at: String,
}

pub fn router(service: Arc<dyn IntentService>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { service })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let network = network_check(state.service.as_ref()).await;
    let ready = network.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("intentdesk-server acting for {}", state.service.account_id()),
        },
        network,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn network_check(service: &dyn IntentService) -> HealthCheck {
    match service.status().await {
        Ok(status) => HealthCheck {
            status: "ready",
            detail: format!("account view succeeded at {} NEAR", status.balance),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("account view failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use intentdesk_agent::runtime::IntentService;
    use intentdesk_core::assets::AssetRegistry;
    use intentdesk_core::negotiation::InMemorySolverBus;
    use intentdesk_core::network::InMemoryNetwork;
    use intentdesk_core::orchestrator::{IntentOrchestrator, OrchestratorConfig};
    use intentdesk_core::signer::KeyMaterial;
    use intentdesk_core::MinorUnits;

    use crate::health::{health, HealthState};

    fn service(network: InMemoryNetwork) -> Arc<dyn IntentService> {
        Arc::new(IntentOrchestrator::new(
            Arc::new(AssetRegistry::default()),
            Arc::new(KeyMaterial::from_seed("alice.near", [4; 32])),
            OrchestratorConfig::default(),
            InMemorySolverBus::default(),
            network,
        ))
    }

    #[tokio::test]
    async fn health_returns_ready_when_network_answers() {
        let network = InMemoryNetwork::default().with_balance("alice.near", MinorUnits(10));

        let (status, Json(payload)) =
            health(State(HealthState { service: service(network) })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.network.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_account_view_fails() {
        let (status, Json(payload)) =
            health(State(HealthState { service: service(InMemoryNetwork::default()) })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.network.status, "degraded");
        assert!(payload.network.detail.contains("alice.near"));
    }
}
