use super::state::ApiState;

use crate::agent::StatusReport;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    orchestrator: StatusReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    messaging: Option<BTreeMap<String, String>>,
}

pub(super) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let messaging = match &state.messaging_manager {
        Some(manager) => Some(manager.health().await),
        None => None,
    };

    Json(HealthResponse {
        status: "healthy",
        service: "ragbot",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        orchestrator: state.orchestrator.get_status().await,
        messaging,
    })
}

pub(super) async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusReport> {
    Json(state.orchestrator.get_status().await)
}

/// Re-probe backends and report the resulting selection.
pub(super) async fn refresh_providers(State(state): State<Arc<ApiState>>) -> Json<StatusReport> {
    let current = state.orchestrator.refresh_availability().await;
    tracing::info!(provider = %current, "provider availability refreshed");
    Json(state.orchestrator.get_status().await)
}
