//! Brave web search API client.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::search::{SearchBackend, SearchResult};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_RESULT_COUNT: usize = 5;
const MAX_RESULT_COUNT: usize = 10;

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

/// Brave Search backend.
pub struct BraveSearch {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl BraveSearch {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ragbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build search HTTP client")?;

        Ok(Self {
            http_client,
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            base_url: config.base_url.clone(),
        })
    }
}

/// Zero means "use the default"; anything else is clamped to the API limit.
fn clamp_count(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_RESULT_COUNT
    } else {
        limit.min(MAX_RESULT_COUNT)
    }
}

#[async_trait]
impl SearchBackend for BraveSearch {
    fn name(&self) -> &str {
        "brave"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::NotConfigured)?;
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let count = clamp_count(limit).to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("offset", "0"),
                ("freshness", "pw"),
                ("text_decorations", "false"),
            ])
            .send()
            .await
            .map_err(|error| SearchError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Request(format!("status {status}: {body}")));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|error| SearchError::BadResponse(error.to_string()))?;

        Ok(body
            .web
            .results
            .into_iter()
            .map(|result| SearchResult {
                title: result.title,
                description: result.description,
                url: result.url,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: Option<&str>) -> BraveSearch {
        BraveSearch::new(&SearchConfig {
            enabled: true,
            api_key: api_key.map(str::to_string),
            base_url: base_url.to_string(),
            timeout_secs: 5,
            max_results: 3,
        })
        .unwrap()
    }

    #[test]
    fn count_is_clamped() {
        assert_eq!(clamp_count(0), 5);
        assert_eq!(clamp_count(3), 3);
        assert_eq!(clamp_count(50), 10);
    }

    #[tokio::test]
    async fn search_sends_token_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Subscription-Token", "brave-key"))
            .and(query_param("q", "rust release"))
            .and(query_param("count", "3"))
            .and(query_param("freshness", "pw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {"results": [
                    {"title": "Rust 1.90", "description": "Released today", "url": "https://blog.rust-lang.org"}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client(&server.uri(), Some("brave-key"))
            .search("rust release", 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rust 1.90");
    }

    #[tokio::test]
    async fn missing_web_section_means_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let results = client(&server.uri(), Some("k")).search("x", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn rejected_requests_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let error = client(&server.uri(), Some("k")).search("x", 5).await.unwrap_err();
        assert!(matches!(error, SearchError::Request(_)));
    }

    #[tokio::test]
    async fn empty_query_and_missing_key_are_rejected_locally() {
        let search = client("http://127.0.0.1:9", Some("k"));
        assert!(matches!(search.search("  ", 5).await, Err(SearchError::EmptyQuery)));

        let search = client("http://127.0.0.1:9", None);
        assert!(!search.is_configured());
        assert!(matches!(search.search("x", 5).await, Err(SearchError::NotConfigured)));
    }
}
