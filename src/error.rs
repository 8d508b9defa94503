//! Top-level error types for Ragbot.

use crate::ProviderKind;
use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Failures from a text-generation backend. Every variant means "this
/// backend cannot answer right now" and is turned into a fallback decision.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("{provider} backend is unreachable: {reason}")]
    Unavailable {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} backend returned a bad response: {reason}")]
    BadResponse {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} backend reported an error: {message}")]
    Api {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} backend is not configured")]
    NotConfigured { provider: ProviderKind },
}

impl GenerationError {
    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Unavailable { .. } => "unavailable",
            GenerationError::BadResponse { .. } => "bad_response",
            GenerationError::Api { .. } => "api_error",
            GenerationError::NotConfigured { .. } => "not_configured",
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            GenerationError::Unavailable { provider, .. }
            | GenerationError::BadResponse { provider, .. }
            | GenerationError::Api { provider, .. }
            | GenerationError::NotConfigured { provider } => *provider,
        }
    }

    /// Map a transport error from reqwest onto the backend taxonomy.
    pub fn from_transport(provider: ProviderKind, error: &reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() {
            GenerationError::Unavailable {
                provider,
                reason: error.to_string(),
            }
        } else {
            GenerationError::BadResponse {
                provider,
                reason: error.to_string(),
            }
        }
    }
}

/// Document retrieval store errors.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("document retrieval is not enabled")]
    NotEnabled,

    #[error("retrieval request failed: {0}")]
    Request(String),

    #[error("retrieval store returned a bad response: {0}")]
    BadResponse(String),

    #[error("failed to read documents: {0}")]
    Io(#[from] std::io::Error),
}

/// Web search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("web search is not configured")]
    NotConfigured,

    #[error("search query cannot be empty")]
    EmptyQuery,

    #[error("search request failed: {0}")]
    Request(String),

    #[error("search backend returned a bad response: {0}")]
    BadResponse(String),
}

/// Messaging adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("{0} adapter is not connected")]
    NotConnected(String),

    #[error("no messaging adapter named '{0}'")]
    UnknownAdapter(String),

    #[error("failed to send message: {0}")]
    SendFailed(String),
}
