//! The capability every real text-generation backend implements.

use crate::error::GenerationError;
use crate::llm::dummy::DummyGenerator;
use crate::search::SearchStatus;
use crate::{ContextItem, HistoryEntry, ProviderKind};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Successful generation from a backend.
#[derive(Debug, Clone)]
pub struct BackendReply {
    /// Cleaned, non-empty reply text.
    pub text: String,
    /// Context the backend added on its own, e.g. live search results.
    pub augmented: Vec<ContextItem>,
}

/// Static description of a backend for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub configured: bool,
    /// Masked credential, when the backend uses one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchStatus>,
}

/// A text-generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Whether the backend has what it needs to be attempted at all.
    fn is_configured(&self) -> bool {
        true
    }

    /// Cheap reachability check with a short timeout.
    async fn probe(&self) -> bool;

    /// Generate a reply for `text` given prompt context and prior turns.
    async fn generate(
        &self,
        text: &str,
        context: &[ContextItem],
        history: &[HistoryEntry],
    ) -> Result<BackendReply, GenerationError>;

    fn status(&self) -> BackendStatus;
}

/// All backends known to one orchestrator.
#[derive(Clone)]
pub struct BackendSet {
    pub local: Arc<dyn Backend>,
    pub hosted: Arc<dyn Backend>,
    pub dummy: DummyGenerator,
}

impl BackendSet {
    pub fn new(local: Arc<dyn Backend>, hosted: Arc<dyn Backend>) -> Self {
        Self {
            local,
            hosted,
            dummy: DummyGenerator,
        }
    }

    /// The real backend for `kind`. `None` for the dummy generator.
    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn Backend>> {
        match kind {
            ProviderKind::Local => Some(&self.local),
            ProviderKind::Hosted => Some(&self.hosted),
            ProviderKind::Dummy => None,
        }
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_none_or(|backend| backend.is_configured())
    }
}

/// Mask a credential for display as `abcd...wxyz`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".into()
    }
}
