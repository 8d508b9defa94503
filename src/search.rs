//! Live web search used to augment prompts about current events.

pub mod brave;

pub use brave::BraveSearch;

use crate::error::SearchError;
use crate::{ContextItem, SourceKind};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub description: String,
    pub url: String,
}

impl SearchResult {
    /// Prompt line for the `index`th (1-based) result.
    pub fn context_line(&self, index: usize) -> String {
        format!(
            "[Search Result {index}] {} - {} (Source: {})",
            self.title, self.description, self.url
        )
    }
}

/// A web search provider.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// Words that suggest the answer depends on recent information.
static RECENCY_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(latest|recent|recently|current|currently|today|tonight|news|update|updates|breaking|trending|now|this week|this month|this year|status|price|prices|weather|stocks?|rates?|elections?|events?|what's happening|20\d{2})\b",
    )
    .expect("recency pattern is valid")
});

/// Question openers that usually ask for facts.
const QUESTION_PATTERNS: &[&str] = &[
    "what is the",
    "how much",
    "where is",
    "when did",
    "who won",
    "what happened",
    "how to",
    "why is",
    "is there",
];

/// Whether a message reads like it needs live results.
pub fn needs_live_results(message: &str) -> bool {
    let lower = message.to_lowercase();
    RECENCY_KEYWORDS.is_match(&lower)
        || QUESTION_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Search status for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SearchStatus {
    pub enabled: bool,
    pub configured: bool,
    pub provider: String,
    pub max_results: usize,
}

/// Decides when to search and turns results into prompt context.
pub struct SearchAugmenter {
    backend: Arc<dyn SearchBackend>,
    enabled: bool,
    max_results: usize,
}

impl SearchAugmenter {
    pub fn new(backend: Arc<dyn SearchBackend>, enabled: bool, max_results: usize) -> Self {
        Self {
            backend,
            enabled,
            max_results,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.enabled && self.backend.is_configured()
    }

    /// True iff search is configured and the message looks time-sensitive
    /// or fact-seeking.
    pub fn should_search(&self, message: &str) -> bool {
        self.is_configured() && needs_live_results(message)
    }

    /// Search for `query` and format the hits as prompt context.
    pub async fn search_context(&self, query: &str) -> Result<Vec<ContextItem>, SearchError> {
        if !self.is_configured() {
            return Err(SearchError::NotConfigured);
        }

        let results = self.backend.search(query, self.max_results).await?;
        tracing::debug!(
            provider = self.backend.name(),
            results = results.len(),
            "web search completed"
        );

        Ok(results
            .iter()
            .enumerate()
            .map(|(index, result)| {
                ContextItem::new(result.context_line(index + 1), SourceKind::Search, &result.url)
            })
            .collect())
    }

    pub fn status(&self) -> SearchStatus {
        SearchStatus {
            enabled: self.enabled,
            configured: self.is_configured(),
            provider: self.backend.name().to_string(),
            max_results: self.max_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSearch {
        configured: bool,
    }

    #[async_trait]
    impl SearchBackend for FixedSearch {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
            Ok((1..=limit)
                .map(|n| SearchResult {
                    title: format!("Title {n}"),
                    description: format!("Description {n}"),
                    url: format!("https://example.com/{n}"),
                })
                .collect())
        }
    }

    fn augmenter(enabled: bool, configured: bool) -> SearchAugmenter {
        SearchAugmenter::new(Arc::new(FixedSearch { configured }), enabled, 3)
    }

    #[test]
    fn recency_questions_trigger_search() {
        let search = augmenter(true, true);
        assert!(search.should_search("What's the latest news on X?"));
        assert!(search.should_search("who won the match"));
        assert!(search.should_search("Bitcoin price"));
        assert!(search.should_search("best films of 2024"));
    }

    #[test]
    fn plain_chat_does_not_search() {
        let search = augmenter(true, true);
        assert!(!search.should_search("hello"));
        // "now" inside "know" is not a keyword.
        assert!(!search.should_search("I know you"));
    }

    #[test]
    fn unconfigured_search_never_triggers() {
        assert!(!augmenter(false, true).should_search("latest news"));
        assert!(!augmenter(true, false).should_search("latest news"));
    }

    #[tokio::test]
    async fn results_become_search_context() {
        let items = augmenter(true, true).search_context("latest news").await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].source_kind, SourceKind::Search);
        assert_eq!(
            items[0].text,
            "[Search Result 1] Title 1 - Description 1 (Source: https://example.com/1)"
        );
        assert_eq!(items[2].source_label, "https://example.com/3");
    }

    #[tokio::test]
    async fn unconfigured_search_context_errors() {
        let error = augmenter(false, true).search_context("x").await.unwrap_err();
        assert!(matches!(error, SearchError::NotConfigured));
    }
}
