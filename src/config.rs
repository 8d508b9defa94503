//! Configuration loading and validation.
//!
//! Precedence, lowest to highest: built-in defaults, the optional TOML file,
//! environment variables, then CLI flags (applied by the binary).

use crate::ProviderPreference;
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Ragbot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub bind: SocketAddr,

    /// Backend selection policy.
    pub provider: ProviderPreference,

    pub local: LocalConfig,
    pub hosted: HostedConfig,
    pub search: SearchConfig,
    pub rag: RagConfig,
    pub discord: DiscordConfig,

    /// Directory for daily-rolling log files. Terminal only when unset.
    pub log_dir: Option<PathBuf>,
}

/// Local model server (Ollama-compatible).
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "tinyllama:latest".into(),
            timeout_secs: 120,
        }
    }
}

/// Hosted chat-completion API (OpenAI-compatible).
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            timeout_secs: 30,
        }
    }
}

/// Live web search used to augment hosted prompts.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Results merged into a prompt when search triggers.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: "https://api.search.brave.com/res/v1/web/search".into(),
            timeout_secs: 10,
            max_results: 3,
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Document retrieval.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub enabled: bool,
    /// Base URL of the retrieval store service.
    pub store_url: String,
    /// Directory of documents to index.
    pub data_path: PathBuf,
    pub collection: String,
    /// Document chunks fetched per message.
    pub top_k: usize,
    /// Emit placeholder context when nothing real was found.
    pub illustrative_context: bool,
    pub index_on_startup: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            store_url: "http://localhost:8000".into(),
            data_path: PathBuf::from("./data"),
            collection: "documents".into(),
            top_k: 3,
            illustrative_context: false,
            index_on_startup: true,
        }
    }
}

/// Discord bot front end.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub token: Option<String>,
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            command_prefix: "!chat ".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            provider: ProviderPreference::Auto,
            local: LocalConfig::default(),
            hosted: HostedConfig::default(),
            search: SearchConfig::default(),
            rag: RagConfig::default(),
            discord: DiscordConfig::default(),
            log_dir: None,
        }
    }
}

// -- TOML file layout --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    bind: Option<String>,
    port: Option<u16>,
    provider: Option<String>,
    log_dir: Option<PathBuf>,
    #[serde(default)]
    local: TomlLocal,
    #[serde(default)]
    hosted: TomlHosted,
    #[serde(default)]
    search: TomlSearch,
    #[serde(default)]
    rag: TomlRag,
    #[serde(default)]
    discord: TomlDiscord,
}

#[derive(Debug, Default, Deserialize)]
struct TomlLocal {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlHosted {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSearch {
    enabled: Option<bool>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlRag {
    enabled: Option<bool>,
    store_url: Option<String>,
    data_path: Option<PathBuf>,
    collection: Option<String>,
    top_k: Option<usize>,
    illustrative_context: Option<bool>,
    index_on_startup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlDiscord {
    enabled: Option<bool>,
    token: Option<String>,
    command_prefix: Option<String>,
}

/// Resolve `env:VAR` indirection in a config string value.
fn resolve_env_value(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var.trim()).ok().filter(|v| !v.is_empty()),
        None => Some(value.to_string()),
    }
}

fn set_string(target: &mut String, value: Option<String>) {
    if let Some(value) = value.as_deref().and_then(resolve_env_value) {
        *target = value;
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Per-user config file, `<config dir>/ragbot/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ragbot").join("config.toml"))
    }

    /// Load configuration from environment variables over the defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a TOML config file, then apply environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: std::sync::Arc::new(error),
        })?;
        let mut config = Self::from_toml_str(&content, path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            reason: error.to_string(),
        })?;

        let mut config = Self::default();

        if let Some(bind) = file.bind.as_deref().and_then(resolve_env_value) {
            config.bind = bind
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid bind address '{bind}'")))?;
        }
        if let Some(port) = file.port {
            config.bind.set_port(port);
        }
        if let Some(provider) = file.provider.as_deref().and_then(resolve_env_value) {
            config.provider = provider.parse()?;
        }
        config.log_dir = file.log_dir;

        set_string(&mut config.local.base_url, file.local.base_url);
        set_string(&mut config.local.model, file.local.model);
        if let Some(timeout) = file.local.timeout_secs {
            config.local.timeout_secs = timeout;
        }

        config.hosted.api_key = file.hosted.api_key.as_deref().and_then(resolve_env_value);
        set_string(&mut config.hosted.base_url, file.hosted.base_url);
        set_string(&mut config.hosted.model, file.hosted.model);
        if let Some(timeout) = file.hosted.timeout_secs {
            config.hosted.timeout_secs = timeout;
        }

        config.search.enabled = file.search.enabled.unwrap_or(config.search.enabled);
        config.search.api_key = file.search.api_key.as_deref().and_then(resolve_env_value);
        set_string(&mut config.search.base_url, file.search.base_url);
        if let Some(timeout) = file.search.timeout_secs {
            config.search.timeout_secs = timeout;
        }
        if let Some(max_results) = file.search.max_results {
            config.search.max_results = max_results;
        }

        config.rag.enabled = file.rag.enabled.unwrap_or(config.rag.enabled);
        set_string(&mut config.rag.store_url, file.rag.store_url);
        if let Some(data_path) = file.rag.data_path {
            config.rag.data_path = data_path;
        }
        set_string(&mut config.rag.collection, file.rag.collection);
        if let Some(top_k) = file.rag.top_k {
            config.rag.top_k = top_k;
        }
        if let Some(illustrative) = file.rag.illustrative_context {
            config.rag.illustrative_context = illustrative;
        }
        if let Some(index_on_startup) = file.rag.index_on_startup {
            config.rag.index_on_startup = index_on_startup;
        }

        config.discord.enabled = file.discord.enabled.unwrap_or(config.discord.enabled);
        config.discord.token = file.discord.token.as_deref().and_then(resolve_env_value);
        set_string(&mut config.discord.command_prefix, file.discord.command_prefix);

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(bind) = get("RAGBOT_BIND") {
            self.bind = bind
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid RAGBOT_BIND '{bind}'")))?;
        }
        if let Some(port) = get("PORT") {
            let port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid PORT '{port}'")))?;
            self.bind.set_port(port);
        }
        if let Some(provider) = get("LLM_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if let Some(log_dir) = get("RAGBOT_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(log_dir));
        }

        if let Some(base_url) = get("LLM_BASE_URL") {
            self.local.base_url = base_url;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.local.model = model;
        }

        if let Some(key) = get("OPENAI_API_KEY") {
            self.hosted.api_key = Some(key);
        }
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            self.hosted.base_url = base_url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.hosted.model = model;
        }

        if let Some(key) = get("BRAVE_SEARCH_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(enabled) = get("SEARCH_ENABLED").as_deref().and_then(parse_bool) {
            self.search.enabled = enabled;
        }

        if let Some(enabled) = get("RAG_ENABLED").as_deref().and_then(parse_bool) {
            self.rag.enabled = enabled;
        }
        if let Some(store_url) = get("RAG_STORE_URL") {
            self.rag.store_url = store_url;
        }
        if let Some(data_path) = get("RAG_DATA_PATH") {
            self.rag.data_path = PathBuf::from(data_path);
        }
        if let Some(collection) = get("RAG_COLLECTION") {
            self.rag.collection = collection;
        }

        if let Some(token) = get("DISCORD_BOT_TOKEN") {
            self.discord.token = Some(token);
        }
        // The prefix is whitespace-sensitive, so read it unfiltered.
        if let Some(prefix) = lookup("DISCORD_COMMAND_PREFIX").filter(|value| !value.is_empty()) {
            self.discord.command_prefix = prefix;
        }

        self.validate()
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.rag.top_k == 0 {
            return Err(ConfigError::Invalid("rag.top_k must be at least 1".into()).into());
        }
        if self.search.max_results == 0 || self.search.max_results > 10 {
            return Err(
                ConfigError::Invalid("search.max_results must be between 1 and 10".into()).into(),
            );
        }
        if self.discord.command_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("discord.command_prefix cannot be empty".into()).into());
        }
        Ok(())
    }

    /// Check that enabled front ends have the credentials they need.
    pub fn validate_discord(&self) -> Result<&str> {
        self.discord
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::MissingKey("DISCORD_BOT_TOKEN".into()).into())
    }
}
