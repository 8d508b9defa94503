//! Local model server backend (Ollama-compatible `/api/generate`).

use crate::config::LocalConfig;
use crate::conversation::prompt::completion_prompt;
use crate::error::GenerationError;
use crate::llm::cleanup::clean_response;
use crate::llm::provider::{Backend, BackendReply, BackendStatus};
use crate::{ContextItem, HistoryEntry, ProviderKind};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

/// Fixed sampling parameters, sized for small models on modest hardware.
#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    repeat_penalty: f32,
    num_ctx: u32,
    stop: [&'static str; 2],
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 300,
            top_p: 0.9,
            repeat_penalty: 1.1,
            num_ctx: 1024,
            stop: ["\nHuman:", "\nUser:"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a locally hosted model server.
pub struct LocalBackend {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl LocalBackend {
    pub fn new(config: &LocalConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build local model HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        let response = self
            .http_client
            .get(self.url("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|error| GenerationError::from_transport(ProviderKind::Local, &error))?;

        if !response.status().is_success() {
            return Err(GenerationError::BadResponse {
                provider: ProviderKind::Local,
                reason: format!("model listing returned status {}", response.status()),
            });
        }

        let tags: TagsResponse =
            response
                .json()
                .await
                .map_err(|error| GenerationError::BadResponse {
                    provider: ProviderKind::Local,
                    reason: format!("failed to decode model listing: {error}"),
                })?;

        Ok(tags.models.into_iter().map(|tag| tag.name).collect())
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> bool {
        match self.list_models().await {
            Ok(models) => {
                tracing::debug!(models = models.len(), "local model server reachable");
                true
            }
            Err(error) => {
                tracing::debug!(%error, "local model server probe failed");
                false
            }
        }
    }

    async fn generate(
        &self,
        text: &str,
        context: &[ContextItem],
        history: &[HistoryEntry],
    ) -> Result<BackendReply, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: completion_prompt(text, context, history),
            stream: false,
            options: GenerateOptions::default(),
        };

        let response = self
            .http_client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|error| GenerationError::from_transport(ProviderKind::Local, &error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BadResponse {
                provider: ProviderKind::Local,
                reason: format!("status {status}: {body}"),
            });
        }

        let body: GenerateResponse =
            response
                .json()
                .await
                .map_err(|error| GenerationError::BadResponse {
                    provider: ProviderKind::Local,
                    reason: format!("failed to decode response: {error}"),
                })?;

        if let Some(message) = body.error.filter(|message| !message.is_empty()) {
            return Err(GenerationError::Api {
                provider: ProviderKind::Local,
                message,
            });
        }

        let text = clean_response(&body.response);
        if text.is_empty() {
            return Err(GenerationError::BadResponse {
                provider: ProviderKind::Local,
                reason: "empty response".into(),
            });
        }

        Ok(BackendReply {
            text,
            augmented: Vec::new(),
        })
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            provider: ProviderKind::Local,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            configured: true,
            api_key: None,
            search: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(base_url: &str) -> LocalBackend {
        LocalBackend::new(&LocalConfig {
            base_url: base_url.to_string(),
            model: "tinyllama:latest".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn generate_sends_prompt_and_cleans_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "tinyllama:latest",
                "stream": false,
                "options": {"num_ctx": 1024}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": " Assistant: Paris.\nHuman: and Spain?",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server.uri())
            .generate("capital of France?", &[], &[])
            .await
            .unwrap();
        assert_eq!(reply.text, "Paris.");
    }

    #[tokio::test]
    async fn error_field_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "model 'tinyllama:latest' not found"
            })))
            .mount(&server)
            .await;

        let error = backend(&server.uri()).generate("hi", &[], &[]).await.unwrap_err();
        assert_eq!(error.kind(), "api_error");
    }

    #[tokio::test]
    async fn non_success_status_is_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let error = backend(&server.uri()).generate("hi", &[], &[]).await.unwrap_err();
        assert_eq!(error.kind(), "bad_response");
    }

    #[tokio::test]
    async fn blank_reply_is_bad_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "   ",
                "done": true
            })))
            .mount(&server)
            .await;

        let error = backend(&server.uri()).generate("hi", &[], &[]).await.unwrap_err();
        assert_eq!(error.kind(), "bad_response");
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        // Port 9 (discard) is not listening in test environments.
        let error = backend("http://127.0.0.1:9").generate("hi", &[], &[]).await.unwrap_err();
        assert_eq!(error.kind(), "unavailable");
        assert!(!backend("http://127.0.0.1:9").probe().await);
    }

    #[tokio::test]
    async fn probe_lists_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "tinyllama:latest"}, {"name": "llama3:8b"}]
            })))
            .mount(&server)
            .await;

        let backend = backend(&server.uri());
        assert!(backend.probe().await);
        assert_eq!(
            backend.list_models().await.unwrap(),
            vec!["tinyllama:latest".to_string(), "llama3:8b".to_string()]
        );
    }
}
