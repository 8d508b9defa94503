//! Document retrieval: the store interface, its HTTP client, and indexing.
//!
//! Ranking and embedding live in the external store. This crate only
//! chunks files, uploads them, and asks for the best matches.

pub mod indexer;
pub mod store;

pub use indexer::{DocumentChunk, IndexReport, index_documents};
pub use store::HttpRetrievalStore;

use crate::error::RetrievalError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chunk returned by a retrieval query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub content: String,
    /// File path (or name) the chunk came from.
    pub source: String,
    /// Relevance, higher is better.
    pub score: f32,
}

impl RetrievedDocument {
    /// Base file name of the source, for display.
    pub fn source_label(&self) -> String {
        std::path::Path::new(&self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.source)
            .to_string()
    }
}

/// Store status for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: String,
    pub url: String,
    pub collection: String,
}

/// An external document index.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Best matches for `text`, optionally narrowed to a scope such as a
    /// Discord channel id.
    async fn query(
        &self,
        text: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    /// Add or replace chunks in the index.
    async fn upsert(&self, chunks: &[DocumentChunk]) -> Result<(), RetrievalError>;

    fn status(&self) -> StoreStatus;
}
