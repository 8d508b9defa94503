use super::chat::{ApiError, api_error};
use super::state::ApiState;

use crate::agent::DocumentQuery;
use crate::error::RetrievalError;
use crate::retrieval::IndexReport;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(super) struct RagRequest {
    #[serde(default)]
    query: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
pub(super) struct IndexResponse {
    status: &'static str,
    path: String,
    #[serde(flatten)]
    report: IndexReport,
}

fn retrieval_error(error: RetrievalError) -> ApiError {
    match error {
        RetrievalError::NotEnabled => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, "Document retrieval is not enabled")
        }
        other => {
            tracing::warn!(error = %other, "document store request failed");
            api_error(StatusCode::BAD_GATEWAY, other.to_string())
        }
    }
}

pub(super) async fn query_documents(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<RagRequest>, JsonRejection>,
) -> Result<Json<DocumentQuery>, ApiError> {
    let Json(request) =
        payload.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid JSON format"))?;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Query cannot be empty"));
    }

    let channel_id = request.channel_id.as_deref().filter(|id| !id.is_empty());
    let result = state
        .orchestrator
        .query_documents(query, channel_id, request.limit.unwrap_or(0))
        .await
        .map_err(retrieval_error)?;

    Ok(Json(result))
}

pub(super) async fn index_documents(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<IndexResponse>, ApiError> {
    let report = state
        .orchestrator
        .index_documents(&state.data_path)
        .await
        .map_err(retrieval_error)?;

    tracing::info!(
        files = report.files_indexed,
        chunks = report.chunks,
        "documents indexed on request"
    );

    Ok(Json(IndexResponse {
        status: "success",
        path: state.data_path.display().to_string(),
        report,
    }))
}
