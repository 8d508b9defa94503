use super::state::ApiState;

use crate::{ChatResponse, HistoryEntry};

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// Body of every rejected request.
#[derive(Debug, Serialize)]
pub(super) struct ErrorResponse {
    message: String,
    status: &'static str,
}

pub(super) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(super) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
            status: "error",
        }),
    )
}

pub(super) fn new_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4().simple())
}

pub(super) async fn chat(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected chat payload");
        api_error(StatusCode::BAD_REQUEST, "Invalid JSON format")
    })?;

    if request.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Message cannot be empty"));
    }

    let session_id = request
        .session_id
        .filter(|session_id| !session_id.trim().is_empty())
        .unwrap_or_else(new_session_id);

    let response = state
        .orchestrator
        .process_message(&request.message, &session_id, request.history)
        .await;

    Ok(Json(response))
}
