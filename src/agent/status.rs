//! Status snapshots reported by the orchestrator.

use crate::conversation::HistoryStats;
use crate::llm::BackendStatus;
use crate::retrieval::StoreStatus;
use crate::search::SearchStatus;
use crate::{ProviderKind, ProviderPreference};

use serde::Serialize;

/// Full orchestrator status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub current_provider: ProviderKind,
    pub preferred_provider: ProviderPreference,
    pub ready: bool,
    pub uptime_seconds: u64,
    pub providers: Vec<ProviderStatus>,
    pub rag: RagStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchStatus>,
}

/// One real backend with its last probe result.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    #[serde(flatten)]
    pub backend: BackendStatus,
    pub available: bool,
    pub active: bool,
}

/// Document retrieval status.
#[derive(Debug, Clone, Serialize)]
pub struct RagStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreStatus>,
    pub top_k: usize,
    pub discord_context: HistoryStats,
}
