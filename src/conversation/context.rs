//! Context assembly: retrieved documents + recent history, in prompt order.

use crate::conversation::prompt::HISTORY_WINDOW;
use crate::retrieval::RetrievalStore;
use crate::{ContextItem, HistoryEntry, Role, SourceKind};

use std::cmp::Ordering;
use std::sync::Arc;

const PLACEHOLDER_CONTEXT: &[&str] = &[
    "[Example Context] Relevant passages from your documents would appear here.",
    "[Example Context] Add files to the data folder and enable retrieval to ground answers in them.",
];

/// Retrieval scope encoded in a session id.
///
/// Discord sessions look like `discord_<user>_<channel>`; the channel id
/// narrows retrieval. Other sessions are unscoped.
pub fn scope_from_session(session_id: &str) -> Option<&str> {
    let rest = session_id.strip_prefix("discord_")?;
    let (_, channel) = rest.rsplit_once('_')?;
    (!channel.is_empty()).then_some(channel)
}

/// Builds the ordered context block for one message.
pub struct ContextSynthesizer {
    retrieval: Option<Arc<dyn RetrievalStore>>,
    top_k: usize,
    illustrative: bool,
}

impl ContextSynthesizer {
    pub fn new(retrieval: Option<Arc<dyn RetrievalStore>>, top_k: usize, illustrative: bool) -> Self {
        Self {
            retrieval,
            top_k,
            illustrative,
        }
    }

    pub fn retrieval(&self) -> Option<&Arc<dyn RetrievalStore>> {
        self.retrieval.as_ref()
    }

    /// Documents (best first), then history (chronological), then
    /// placeholders if enabled and nothing else was found. Search results
    /// are appended later by the backend that fetches them.
    ///
    /// Retrieval failures only cost the document items.
    pub async fn build_context(
        &self,
        text: &str,
        session_id: &str,
        history: &[HistoryEntry],
    ) -> Vec<ContextItem> {
        let mut items = self.document_items(text, session_id).await;

        let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
        items.extend(window.iter().filter(|entry| !entry.content.trim().is_empty()).map(|entry| {
            let label = match entry.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            ContextItem::new(entry.content.clone(), SourceKind::History, label)
        }));

        if items.is_empty() && self.illustrative {
            items.extend(
                PLACEHOLDER_CONTEXT
                    .iter()
                    .map(|text| ContextItem::new(*text, SourceKind::Document, "example")),
            );
        }

        items
    }

    async fn document_items(&self, text: &str, session_id: &str) -> Vec<ContextItem> {
        let Some(retrieval) = &self.retrieval else {
            return Vec::new();
        };

        let scope = scope_from_session(session_id);
        let mut documents = match retrieval.query(text, scope, self.top_k).await {
            Ok(documents) => documents,
            Err(error) => {
                tracing::warn!(%error, session_id, "document retrieval failed, continuing without it");
                return Vec::new();
            }
        };

        documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        documents.truncate(self.top_k);
        tracing::debug!(documents = documents.len(), scope, "retrieved document context");

        documents
            .iter()
            .map(|document| {
                ContextItem::new(document.content.clone(), SourceKind::Document, document.source_label())
            })
            .collect()
    }
}
