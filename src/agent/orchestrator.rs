//! Provider orchestration: backend selection, fallback, and the single
//! `process_message` entry point shared by every front end.

use crate::agent::status::{ProviderStatus, RagStatus, StatusReport};
use crate::conversation::{ChannelHistory, ContextSynthesizer};
use crate::error::RetrievalError;
use crate::llm::routing::{self, Availability};
use crate::llm::BackendSet;
use crate::retrieval::{IndexReport, RetrievedDocument};
use crate::search::SearchAugmenter;
use crate::{
    ChatResponse, ContextItem, GenerationResult, HistoryEntry, Message, ProviderKind,
    ProviderPreference, SourceKind,
};

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Default number of documents for an explicit retrieval query.
const DEFAULT_QUERY_LIMIT: usize = 5;

/// Channel messages quoted alongside an explicit retrieval query.
const CHANNEL_CONTEXT_LIMIT: usize = 10;

/// Mutable provider selection. `current` is always set.
#[derive(Debug, Clone, Copy)]
struct ProviderState {
    current: ProviderKind,
    availability: Availability,
}

/// Result of an explicit document query.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentQuery {
    pub query: String,
    pub documents: Vec<RetrievedDocument>,
    /// Recent channel messages, `author: content`, oldest first.
    pub context: Vec<String>,
    pub total: usize,
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Owns provider state and answers messages.
pub struct Orchestrator {
    backends: BackendSet,
    synthesizer: ContextSynthesizer,
    search: Option<Arc<SearchAugmenter>>,
    preference: ProviderPreference,
    state: RwLock<ProviderState>,
    channel_history: Arc<ChannelHistory>,
    top_k: usize,
    started_at: Instant,
}

impl Orchestrator {
    /// Create an orchestrator. Until [`initialize`](Self::initialize) runs,
    /// the current provider is the dummy generator.
    pub fn new(
        backends: BackendSet,
        synthesizer: ContextSynthesizer,
        preference: ProviderPreference,
        channel_history: Arc<ChannelHistory>,
        top_k: usize,
    ) -> Self {
        Self {
            backends,
            synthesizer,
            search: None,
            preference,
            state: RwLock::new(ProviderState {
                current: ProviderKind::Dummy,
                availability: Availability::default(),
            }),
            channel_history,
            top_k,
            started_at: Instant::now(),
        }
    }

    /// Attach the search augmenter so its status is reported.
    pub fn with_search(mut self, search: Arc<SearchAugmenter>) -> Self {
        self.search = Some(search);
        self
    }

    pub async fn current_provider(&self) -> ProviderKind {
        self.state.read().await.current
    }

    /// Probe every configured real backend concurrently.
    async fn probe_all(&self) -> Availability {
        let probe = |kind: ProviderKind| async move {
            match self.backends.get(kind) {
                Some(backend) if backend.is_configured() => backend.probe().await,
                _ => false,
            }
        };
        let (local, hosted) = tokio::join!(probe(ProviderKind::Local), probe(ProviderKind::Hosted));
        Availability { local, hosted }
    }

    /// Probe backends and pick the startup provider.
    pub async fn initialize(&self) -> ProviderKind {
        let availability = self.probe_all().await;
        let current = routing::initial_selection(self.preference, availability);

        let mut state = self.state.write().await;
        state.availability = availability;
        state.current = current;

        if let Some(preferred) = self.preference.forced()
            && preferred != current
        {
            tracing::warn!(
                %preferred,
                selected = %current,
                "preferred provider unavailable at startup"
            );
        }
        tracing::info!(
            provider = %current,
            preference = %self.preference,
            local_available = availability.local,
            hosted_available = availability.hosted,
            "provider selected"
        );
        current
    }

    /// Re-probe backends and store their availability. Forced mode never
    /// switches; auto mode switches only when the active backend went down
    /// and the alternate came up.
    pub async fn refresh_availability(&self) -> ProviderKind {
        let latest = self.probe_all().await;

        let mut state = self.state.write().await;
        let previous = state.availability;
        state.availability = latest;
        if let Some(next) = routing::refresh_decision(self.preference, state.current, previous, latest) {
            tracing::info!(from = %state.current, to = %next, "switching provider after refresh");
            state.current = next;
        }
        state.current
    }

    /// Walk the attempt order for one message. Never fails: the dummy
    /// generator ends every walk.
    ///
    /// `succeeded` is true when the first backend in the order answered.
    pub async fn generate(&self, message: &Message, context: &[ContextItem]) -> GenerationResult {
        let current = self.current_provider().await;
        let order = routing::attempt_order(self.preference, current, |kind| {
            self.backends.is_configured(kind)
        });

        for (attempt, kind) in order.iter().copied().enumerate() {
            let Some(backend) = self.backends.get(kind) else {
                let text = self.backends.dummy.reply(&message.text, message.history.len());
                if attempt > 0 {
                    tracing::info!(session_id = %message.session_id, "all backends failed, using canned reply");
                }
                return GenerationResult {
                    text,
                    used_provider: ProviderKind::Dummy,
                    succeeded: attempt == 0,
                    augmented: Vec::new(),
                };
            };

            match backend.generate(&message.text, context, &message.history).await {
                Ok(reply) => {
                    tracing::info!(
                        provider = %kind,
                        model = backend.model(),
                        session_id = %message.session_id,
                        "response generated"
                    );
                    return GenerationResult {
                        text: reply.text,
                        used_provider: kind,
                        succeeded: attempt == 0,
                        augmented: reply.augmented,
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        provider = %kind,
                        error_kind = error.kind(),
                        %error,
                        "generation failed, falling back"
                    );
                }
            }
        }

        // attempt_order always ends with Dummy, so this is only reached if
        // that invariant is broken.
        GenerationResult {
            text: self.backends.dummy.reply(&message.text, message.history.len()),
            used_provider: ProviderKind::Dummy,
            succeeded: false,
            augmented: Vec::new(),
        }
    }

    /// Answer one message. Always returns a non-empty, successful response.
    pub async fn process_message(
        &self,
        text: &str,
        session_id: &str,
        history: Vec<HistoryEntry>,
    ) -> ChatResponse {
        let message = Message {
            text: text.trim().to_string(),
            session_id: session_id.to_string(),
            history,
        };

        let mut context = self
            .synthesizer
            .build_context(&message.text, &message.session_id, &message.history)
            .await;
        let result = self.generate(&message, &context).await;
        context.extend(result.augmented);

        let grounding: Vec<&ContextItem> = context
            .iter()
            .filter(|item| item.source_kind != SourceKind::History)
            .collect();
        let mut sources: Vec<String> = Vec::new();
        for item in &grounding {
            if !sources.contains(&item.source_label) {
                sources.push(item.source_label.clone());
            }
        }

        ChatResponse {
            message: result.text,
            session_id: message.session_id,
            context: grounding.iter().map(|item| item.text.clone()).collect(),
            sources,
            status: "success",
            provider: result.used_provider,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Explicit retrieval query plus recent channel messages.
    pub async fn query_documents(
        &self,
        query: &str,
        channel_id: Option<&str>,
        limit: usize,
    ) -> Result<DocumentQuery, RetrievalError> {
        let store = self.synthesizer.retrieval().ok_or(RetrievalError::NotEnabled)?;
        let limit = if limit == 0 { DEFAULT_QUERY_LIMIT } else { limit };

        let documents = store.query(query, channel_id, limit).await?;
        let context = match channel_id {
            Some(channel_id) => {
                self.channel_history
                    .context_snippets(channel_id, CHANNEL_CONTEXT_LIMIT)
                    .await
            }
            None => Vec::new(),
        };

        Ok(DocumentQuery {
            query: query.to_string(),
            total: documents.len(),
            documents,
            context,
            status: "success",
            timestamp: chrono::Utc::now(),
        })
    }

    /// Index every supported file under `root` into the retrieval store.
    pub async fn index_documents(&self, root: &Path) -> Result<IndexReport, RetrievalError> {
        let store = self.synthesizer.retrieval().ok_or(RetrievalError::NotEnabled)?;
        crate::retrieval::index_documents(store.as_ref(), root).await
    }

    pub async fn get_status(&self) -> StatusReport {
        let state = *self.state.read().await;

        let providers = ProviderKind::REAL
            .into_iter()
            .filter_map(|kind| self.backends.get(kind).map(|backend| (kind, backend)))
            .map(|(kind, backend)| ProviderStatus {
                backend: backend.status(),
                available: state.availability.get(kind),
                active: state.current == kind,
            })
            .collect();

        StatusReport {
            current_provider: state.current,
            preferred_provider: self.preference,
            ready: true,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            providers,
            rag: RagStatus {
                enabled: self.synthesizer.retrieval().is_some(),
                store: self.synthesizer.retrieval().map(|store| store.status()),
                top_k: self.top_k,
                discord_context: self.channel_history.stats().await,
            },
            search: self.search.as_ref().map(|search| search.status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use crate::llm::dummy::DummyGenerator;
    use crate::llm::{Backend, BackendReply, BackendStatus};
    use crate::retrieval::{DocumentChunk, RetrievalStore, StoreStatus};
    use crate::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ScriptedBackend {
        kind: ProviderKind,
        reply: Option<&'static str>,
        search_results: Vec<ContextItem>,
        configured: bool,
        reachable: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn answering(kind: ProviderKind, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                kind,
                reply: Some(reply),
                search_results: Vec::new(),
                configured: true,
                reachable: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                reply: None,
                search_results: Vec::new(),
                configured: true,
                reachable: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }

        fn searching(kind: ProviderKind, reply: &'static str, results: Vec<ContextItem>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                reply: Some(reply),
                search_results: results,
                configured: true,
                reachable: AtomicBool::new(true),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn probe(&self) -> bool {
            self.reachable.load(Ordering::SeqCst)
        }

        async fn generate(
            &self,
            _text: &str,
            _context: &[ContextItem],
            _history: &[HistoryEntry],
        ) -> Result<BackendReply, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(BackendReply {
                    text: text.to_string(),
                    augmented: self.search_results.clone(),
                }),
                None => Err(GenerationError::Unavailable {
                    provider: self.kind,
                    reason: "connection refused".into(),
                }),
            }
        }

        fn status(&self) -> BackendStatus {
            BackendStatus {
                provider: self.kind,
                model: "scripted".into(),
                base_url: String::new(),
                timeout_secs: 1,
                configured: self.configured,
                api_key: None,
                search: None,
            }
        }
    }

    /// Store answering every query with the same (source, content, score) rows.
    struct FixedStore {
        rows: Vec<(&'static str, &'static str, f32)>,
    }

    #[async_trait]
    impl RetrievalStore for FixedStore {
        async fn query(
            &self,
            _text: &str,
            _scope: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
            Ok(self
                .rows
                .iter()
                .enumerate()
                .map(|(index, (source, content, score))| RetrievedDocument {
                    id: format!("chunk_{index}"),
                    content: content.to_string(),
                    source: source.to_string(),
                    score: *score,
                })
                .collect())
        }

        async fn upsert(&self, _chunks: &[DocumentChunk]) -> Result<(), RetrievalError> {
            Ok(())
        }

        fn status(&self) -> StoreStatus {
            StoreStatus {
                backend: "fixed".into(),
                url: String::new(),
                collection: "docs".into(),
            }
        }
    }

    fn orchestrator(
        local: Arc<ScriptedBackend>,
        hosted: Arc<ScriptedBackend>,
        preference: ProviderPreference,
    ) -> Orchestrator {
        Orchestrator::new(
            BackendSet::new(local, hosted),
            ContextSynthesizer::new(None, 3, false),
            preference,
            Arc::new(ChannelHistory::new()),
            3,
        )
    }

    fn orchestrator_with_store(
        local: Arc<ScriptedBackend>,
        hosted: Arc<ScriptedBackend>,
        store: FixedStore,
    ) -> Orchestrator {
        let store: Arc<dyn RetrievalStore> = Arc::new(store);
        Orchestrator::new(
            BackendSet::new(local, hosted),
            ContextSynthesizer::new(Some(store), 5, false),
            ProviderPreference::Auto,
            Arc::new(ChannelHistory::new()),
            5,
        )
    }

    fn three_chunks() -> FixedStore {
        FixedStore {
            rows: vec![
                ("data/a.txt", "A", 0.7),
                ("data/b.txt", "B", 0.9),
                ("data/b.txt", "C", 0.8),
            ],
        }
    }

    #[tokio::test]
    async fn forced_hosted_failure_goes_to_dummy_never_local() {
        let local = ScriptedBackend::answering(ProviderKind::Local, "from local");
        let hosted = ScriptedBackend::failing(ProviderKind::Hosted);
        let orchestrator = orchestrator(
            local.clone(),
            hosted.clone(),
            ProviderPreference::Forced(ProviderKind::Hosted),
        );
        assert_eq!(orchestrator.initialize().await, ProviderKind::Hosted);

        let response = orchestrator.process_message("what's up", "sess_1", Vec::new()).await;

        assert_eq!(response.provider, ProviderKind::Dummy);
        assert_eq!(response.status, "success");
        assert!(!response.message.is_empty());
        assert_eq!(hosted.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn auto_with_both_failing_uses_dummy() {
        let local = ScriptedBackend::failing(ProviderKind::Local);
        let hosted = ScriptedBackend::failing(ProviderKind::Hosted);
        let orchestrator = orchestrator(local.clone(), hosted.clone(), ProviderPreference::Auto);
        orchestrator.initialize().await;

        let message = Message {
            text: "tell me something".into(),
            session_id: "sess_2".into(),
            history: Vec::new(),
        };
        let result = orchestrator.generate(&message, &[]).await;

        assert_eq!(result.used_provider, ProviderKind::Dummy);
        assert!(!result.succeeded);
        assert!(!result.text.is_empty());
        assert_eq!(local.calls(), 1);
        assert_eq!(hosted.calls(), 1);
    }

    #[tokio::test]
    async fn auto_local_failure_falls_over_to_hosted() {
        let local = ScriptedBackend::failing(ProviderKind::Local);
        let hosted = ScriptedBackend::answering(ProviderKind::Hosted, "from hosted");
        let orchestrator = orchestrator(local, hosted, ProviderPreference::Auto);
        assert_eq!(orchestrator.initialize().await, ProviderKind::Local);

        let response = orchestrator.process_message("question", "sess_3", Vec::new()).await;

        assert_eq!(response.provider, ProviderKind::Hosted);
        assert_eq!(response.message, "from hosted");

        // Hosted answered second in the order, so the walk did not succeed first time.
        let message = Message {
            text: "question".into(),
            session_id: "sess_3".into(),
            history: Vec::new(),
        };
        let result = orchestrator.generate(&message, &[]).await;
        assert_eq!(result.used_provider, ProviderKind::Hosted);
        assert!(!result.succeeded);

        // Message-time fallback does not change the selected provider.
        assert_eq!(orchestrator.current_provider().await, ProviderKind::Local);
    }

    #[tokio::test]
    async fn hello_with_no_backends_gets_a_greeting() {
        let local = ScriptedBackend::failing(ProviderKind::Local);
        let hosted = ScriptedBackend::failing(ProviderKind::Hosted);
        local.reachable.store(false, Ordering::SeqCst);
        hosted.reachable.store(false, Ordering::SeqCst);
        let orchestrator = orchestrator(local, hosted, ProviderPreference::Auto);
        assert_eq!(orchestrator.initialize().await, ProviderKind::Dummy);

        let response = orchestrator.process_message("hello", "sess_4", Vec::new()).await;

        assert_eq!(response.status, "success");
        assert!(DummyGenerator::is_greeting_template(&response.message));
    }

    #[tokio::test]
    async fn responses_are_never_empty() {
        let preferences = [
            ProviderPreference::Auto,
            ProviderPreference::Forced(ProviderKind::Local),
            ProviderPreference::Forced(ProviderKind::Hosted),
            ProviderPreference::Forced(ProviderKind::Dummy),
        ];
        for preference in preferences {
            let orchestrator = orchestrator(
                ScriptedBackend::failing(ProviderKind::Local),
                ScriptedBackend::failing(ProviderKind::Hosted),
                preference,
            );
            orchestrator.initialize().await;
            let history = vec![HistoryEntry::new(Role::User, "earlier")];
            let response = orchestrator.process_message("   ", "sess_5", history).await;
            assert!(!response.message.is_empty(), "empty reply for {preference}");
            assert_eq!(response.status, "success");
        }
    }

    #[tokio::test]
    async fn forced_dummy_counts_as_success() {
        let orchestrator = orchestrator(
            ScriptedBackend::answering(ProviderKind::Local, "unused"),
            ScriptedBackend::answering(ProviderKind::Hosted, "unused"),
            ProviderPreference::Forced(ProviderKind::Dummy),
        );
        orchestrator.initialize().await;

        let message = Message {
            text: "hi".into(),
            session_id: "s".into(),
            history: Vec::new(),
        };
        let result = orchestrator.generate(&message, &[]).await;
        assert_eq!(result.used_provider, ProviderKind::Dummy);
        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn refresh_switches_when_active_backend_drops() {
        let local = ScriptedBackend::answering(ProviderKind::Local, "local");
        let hosted = ScriptedBackend::answering(ProviderKind::Hosted, "hosted");
        hosted.reachable.store(false, Ordering::SeqCst);
        let orchestrator = orchestrator(local.clone(), hosted.clone(), ProviderPreference::Auto);
        assert_eq!(orchestrator.initialize().await, ProviderKind::Local);

        local.reachable.store(false, Ordering::SeqCst);
        hosted.reachable.store(true, Ordering::SeqCst);
        assert_eq!(orchestrator.refresh_availability().await, ProviderKind::Hosted);

        // Local recovering does not pull the selection back.
        local.reachable.store(true, Ordering::SeqCst);
        assert_eq!(orchestrator.refresh_availability().await, ProviderKind::Hosted);
    }

    #[tokio::test]
    async fn forced_refresh_keeps_selection() {
        let local = ScriptedBackend::answering(ProviderKind::Local, "local");
        let hosted = ScriptedBackend::answering(ProviderKind::Hosted, "hosted");
        let orchestrator = orchestrator(
            local.clone(),
            hosted.clone(),
            ProviderPreference::Forced(ProviderKind::Local),
        );
        orchestrator.initialize().await;

        local.reachable.store(false, Ordering::SeqCst);
        hosted.reachable.store(false, Ordering::SeqCst);
        assert_eq!(orchestrator.refresh_availability().await, ProviderKind::Local);

        let status = orchestrator.get_status().await;
        assert_eq!(status.current_provider, ProviderKind::Local);
        assert!(!status.providers[0].available);
        assert!(status.providers[0].active);
        assert!(!status.providers[1].available);

        local.reachable.store(true, Ordering::SeqCst);
        orchestrator.refresh_availability().await;
        assert!(orchestrator.get_status().await.providers[0].available);
    }

    #[tokio::test]
    async fn response_context_lists_documents_by_score_without_history() {
        let local = ScriptedBackend::failing(ProviderKind::Local);
        let hosted = ScriptedBackend::failing(ProviderKind::Hosted);
        local.reachable.store(false, Ordering::SeqCst);
        hosted.reachable.store(false, Ordering::SeqCst);
        let orchestrator = orchestrator_with_store(local, hosted, three_chunks());
        orchestrator.initialize().await;

        let history = vec![HistoryEntry::new(Role::User, "what did the docs say before")];
        let response = orchestrator.process_message("summarize the docs", "sess_6", history).await;

        assert_eq!(response.provider, ProviderKind::Dummy);
        assert_eq!(response.context, vec!["B", "C", "A"]);
        assert_eq!(response.sources, vec!["b.txt", "a.txt"]);
    }

    #[tokio::test]
    async fn search_results_from_the_backend_join_the_response_context() {
        let results = vec![
            ContextItem::new("Rust 1.90 is out", SourceKind::Search, "https://blog.rust-lang.org/"),
            ContextItem::new("Release notes", SourceKind::Search, "https://blog.rust-lang.org/"),
        ];
        let local = ScriptedBackend::failing(ProviderKind::Local);
        let hosted = ScriptedBackend::searching(ProviderKind::Hosted, "it is out", results);
        let orchestrator = orchestrator_with_store(local, hosted, three_chunks());
        assert_eq!(orchestrator.initialize().await, ProviderKind::Local);

        let history = vec![
            HistoryEntry::new(Role::User, "is there a new rust release"),
            HistoryEntry::new(Role::Assistant, "let me check"),
        ];
        let response = orchestrator.process_message("latest rust news", "sess_7", history).await;

        assert_eq!(response.provider, ProviderKind::Hosted);
        assert_eq!(response.message, "it is out");
        assert_eq!(
            response.context,
            vec!["B", "C", "A", "Rust 1.90 is out", "Release notes"]
        );
        assert_eq!(
            response.sources,
            vec!["b.txt", "a.txt", "https://blog.rust-lang.org/"]
        );
    }

    #[tokio::test]
    async fn document_query_requires_retrieval() {
        let orchestrator = orchestrator(
            ScriptedBackend::failing(ProviderKind::Local),
            ScriptedBackend::failing(ProviderKind::Hosted),
            ProviderPreference::Auto,
        );
        let error = orchestrator.query_documents("x", None, 0).await.unwrap_err();
        assert!(matches!(error, RetrievalError::NotEnabled));
    }

    #[tokio::test]
    async fn status_reports_selection_and_availability() {
        let local = ScriptedBackend::answering(ProviderKind::Local, "local");
        let hosted = ScriptedBackend::answering(ProviderKind::Hosted, "hosted");
        hosted.reachable.store(false, Ordering::SeqCst);
        let orchestrator = orchestrator(local, hosted, ProviderPreference::Auto);
        orchestrator.initialize().await;

        let status = orchestrator.get_status().await;
        assert_eq!(status.current_provider, ProviderKind::Local);
        assert_eq!(status.providers.len(), 2);
        assert!(status.providers[0].available && status.providers[0].active);
        assert!(!status.providers[1].available);
        assert!(!status.rag.enabled);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["preferred_provider"], "auto");
        assert_eq!(json["providers"][0]["provider"], "local");
    }
}
