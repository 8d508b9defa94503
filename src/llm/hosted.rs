//! Hosted chat-completion backend (OpenAI-compatible `/chat/completions`).

use crate::config::HostedConfig;
use crate::conversation::prompt::{ChatMessage, chat_messages};
use crate::error::GenerationError;
use crate::llm::cleanup::clean_response;
use crate::llm::provider::{Backend, BackendReply, BackendStatus, mask_secret};
use crate::search::SearchAugmenter;
use crate::{ContextItem, HistoryEntry, ProviderKind};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stop: [&'static str; 3],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Client for a hosted chat-completion API.
pub struct HostedBackend {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout_secs: u64,
    search: Option<Arc<SearchAugmenter>>,
}

impl HostedBackend {
    pub fn new(config: &HostedConfig, search: Option<Arc<SearchAugmenter>>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build hosted API HTTP client")?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            search,
        })
    }

    /// Live search results for `text`, when the message calls for them.
    /// Search problems only cost the augmentation.
    async fn search_context(&self, text: &str) -> Vec<ContextItem> {
        let Some(search) = self.search.as_ref().filter(|search| search.should_search(text)) else {
            return Vec::new();
        };

        match search.search_context(text).await {
            Ok(items) => {
                tracing::info!(results = items.len(), "added web search results to context");
                items
            }
            Err(error) => {
                tracing::warn!(%error, "web search failed, continuing without it");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Backend for HostedBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hosted
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Availability is "has a credential"; no request is spent on probing.
    async fn probe(&self) -> bool {
        self.is_configured()
    }

    async fn generate(
        &self,
        text: &str,
        context: &[ContextItem],
        history: &[HistoryEntry],
    ) -> Result<BackendReply, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::NotConfigured {
            provider: ProviderKind::Hosted,
        })?;

        let augmented = self.search_context(text).await;
        let mut full_context = context.to_vec();
        full_context.extend(augmented.iter().cloned());

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: chat_messages(text, &full_context, history),
            max_tokens: 150,
            temperature: 0.7,
            stop: ["\n\nHuman:", "\nHuman:", "User:"],
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| GenerationError::from_transport(ProviderKind::Hosted, &error))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| GenerationError::BadResponse {
            provider: ProviderKind::Hosted,
            reason: format!("failed to read response body: {error}"),
        })?;

        let parsed: ChatCompletionResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(error) => {
                let reason = if status.is_success() {
                    format!("failed to decode response: {error}")
                } else {
                    format!("status {status}: {body}")
                };
                return Err(GenerationError::BadResponse {
                    provider: ProviderKind::Hosted,
                    reason,
                });
            }
        };

        if let Some(error) = parsed.error {
            return Err(GenerationError::Api {
                provider: ProviderKind::Hosted,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(GenerationError::BadResponse {
                provider: ProviderKind::Hosted,
                reason: format!("status {status}"),
            });
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::BadResponse {
                provider: ProviderKind::Hosted,
                reason: "no response choices".into(),
            })?;

        let text = clean_response(&content);
        if text.is_empty() {
            return Err(GenerationError::BadResponse {
                provider: ProviderKind::Hosted,
                reason: "empty response".into(),
            });
        }

        Ok(BackendReply { text, augmented })
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            provider: ProviderKind::Hosted,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            configured: self.is_configured(),
            api_key: self.api_key.as_deref().map(mask_secret),
            search: self.search.as_ref().map(|search| search.status()),
        }
    }
}
