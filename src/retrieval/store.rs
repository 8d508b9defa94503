//! JSON-over-HTTP client for an external retrieval store.
//!
//! The service exposes one collection per corpus:
//!
//! - `POST {base}/collections/{name}/query` with `{query, scope, limit}`,
//!   answering `{results: [{id, content, source, score}]}`
//! - `POST {base}/collections/{name}/documents` with `{documents: [...]}`

use crate::config::RagConfig;
use crate::error::RetrievalError;
use crate::retrieval::{DocumentChunk, RetrievalStore, RetrievedDocument, StoreStatus};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<RetrievedDocument>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    documents: &'a [DocumentChunk],
}

/// Retrieval store reached over HTTP.
pub struct HttpRetrievalStore {
    http_client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpRetrievalStore {
    pub fn new(config: &RagConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build retrieval HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.store_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}/{suffix}", self.base_url, self.collection)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RetrievalError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(RetrievalError::Request(format!("status {status}: {body}")))
    }
}

#[async_trait]
impl RetrievalStore for HttpRetrievalStore {
    async fn query(
        &self,
        text: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let response = self
            .http_client
            .post(self.collection_url("query"))
            .json(&QueryRequest {
                query: text,
                scope,
                limit,
            })
            .send()
            .await
            .map_err(|error| RetrievalError::Request(error.to_string()))?;

        let body: QueryResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|error| RetrievalError::BadResponse(error.to_string()))?;

        Ok(body.results)
    }

    async fn upsert(&self, chunks: &[DocumentChunk]) -> Result<(), RetrievalError> {
        let response = self
            .http_client
            .post(self.collection_url("documents"))
            .json(&UpsertRequest { documents: chunks })
            .send()
            .await
            .map_err(|error| RetrievalError::Request(error.to_string()))?;

        check_status(response).await?;
        Ok(())
    }

    fn status(&self) -> StoreStatus {
        StoreStatus {
            backend: "http".into(),
            url: self.base_url.clone(),
            collection: self.collection.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::indexer::ChunkMetadata;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(base_url: &str) -> HttpRetrievalStore {
        HttpRetrievalStore::new(&RagConfig {
            store_url: format!("{base_url}/"),
            collection: "documents".into(),
            ..RagConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn query_posts_scope_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/documents/query"))
            .and(body_partial_json(serde_json::json!({
                "query": "install steps",
                "scope": "1234",
                "limit": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"id": "guide_chunk_0", "content": "Run cargo install.", "source": "data/guide.md", "score": 0.82}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = store(&server.uri())
            .query("install steps", Some("1234"), 3)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_label(), "guide.md");
    }

    #[tokio::test]
    async fn upsert_posts_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/documents/documents"))
            .and(body_partial_json(serde_json::json!({
                "documents": [{"id": "a_chunk_0"}]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let chunk = DocumentChunk {
            id: "a_chunk_0".into(),
            content: "text".into(),
            source: "a.txt".into(),
            metadata: ChunkMetadata {
                file_name: "a.txt".into(),
                file_path: "a.txt".into(),
                file_type: ".txt".into(),
                chunk_index: 0,
                total_chunks: 1,
                indexed_at: "2025-01-01T00:00:00Z".into(),
            },
        };
        store(&server.uri()).upsert(&[chunk]).await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_surface_as_request_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .mount(&server)
            .await;

        let error = store(&server.uri()).query("x", None, 3).await.unwrap_err();
        assert!(matches!(error, RetrievalError::Request(message) if message.contains("503")));
    }
}
