//! Ragbot: a chat gateway that routes every message to the best available
//! text-generation backend, augmented with retrieved documents and web search.

pub mod agent;
pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod retrieval;
pub mod search;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which text-generation backend produced (or should produce) a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Locally hosted model server.
    Local,
    /// Hosted chat-completion API.
    Hosted,
    /// Canned-response generator. Never fails.
    Dummy,
}

impl ProviderKind {
    /// The backends that call out to a real model, in auto-mode preference order.
    pub const REAL: [ProviderKind; 2] = [ProviderKind::Local, ProviderKind::Hosted];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Hosted => "hosted",
            ProviderKind::Dummy => "dummy",
        }
    }

    pub fn is_real(&self) -> bool {
        !matches!(self, ProviderKind::Dummy)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = error::ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" | "ollama" => Ok(ProviderKind::Local),
            "hosted" | "chatgpt" | "openai" => Ok(ProviderKind::Hosted),
            "dummy" => Ok(ProviderKind::Dummy),
            other => Err(error::ConfigError::Invalid(format!(
                "unknown provider '{other}', expected local, hosted or dummy"
            ))),
        }
    }
}

/// How the orchestrator picks a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPreference {
    /// Pick the best available backend and fail over between real backends.
    #[default]
    Auto,
    /// Only ever use this backend, falling back straight to the dummy generator.
    Forced(ProviderKind),
}

impl ProviderPreference {
    pub fn forced(&self) -> Option<ProviderKind> {
        match self {
            ProviderPreference::Auto => None,
            ProviderPreference::Forced(kind) => Some(*kind),
        }
    }
}

impl std::fmt::Display for ProviderPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderPreference::Auto => f.write_str("auto"),
            ProviderPreference::Forced(kind) => write!(f, "{kind}"),
        }
    }
}

impl std::str::FromStr for ProviderPreference {
    type Err = error::ConfigError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(ProviderPreference::Auto);
        }
        trimmed.parse().map(ProviderPreference::Forced)
    }
}

impl Serialize for ProviderPreference {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Speaker of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of a conversation, supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A single inbound request to the orchestrator. History is chronological.
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
}

/// Where a piece of prompt context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Document,
    Search,
    History,
}

/// A snippet of context fed into a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub text: String,
    pub source_kind: SourceKind,
    pub source_label: String,
}

impl ContextItem {
    pub fn new(text: impl Into<String>, source_kind: SourceKind, source_label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_kind,
            source_label: source_label.into(),
        }
    }
}

/// Outcome of one generation walk through the fallback policy.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub used_provider: ProviderKind,
    /// True iff the first backend in the attempt order answered. A fallback
    /// to the other real backend or to the dummy generator leaves it false.
    pub succeeded: bool,
    /// Context the backend added on its own (live search results).
    pub augmented: Vec<ContextItem>,
}

/// Response returned to both HTTP and Discord front ends.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub status: &'static str,
    pub provider: ProviderKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Inbound message from a messaging platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub source: String,
    /// Session id handed to the orchestrator, e.g. `discord_<user>_<channel>`.
    pub conversation_id: String,
    pub content: String,
    /// Recent conversation gathered by the adapter, chronological.
    pub history: Vec<HistoryEntry>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Adapter routing data, e.g. `discord_channel_id`.
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Outbound response to messaging platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundResponse {
    Text(String),
}

/// Status updates for messaging platforms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusUpdate {
    /// Show a typing indicator while the reply is generated.
    Thinking,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_aliases_parse() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert_eq!("ChatGPT".parse::<ProviderKind>().unwrap(), ProviderKind::Hosted);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::Hosted);
        assert!("mystery".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn preference_parses_auto_and_forced() {
        assert_eq!("auto".parse::<ProviderPreference>().unwrap(), ProviderPreference::Auto);
        assert_eq!("".parse::<ProviderPreference>().unwrap(), ProviderPreference::Auto);
        assert_eq!(
            "local".parse::<ProviderPreference>().unwrap(),
            ProviderPreference::Forced(ProviderKind::Local)
        );
    }

    #[test]
    fn history_entry_timestamp_is_optional_on_the_wire() {
        let entry: HistoryEntry =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.content, "hi");
    }
}
