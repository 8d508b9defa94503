//! Ragbot CLI entry point.

use ragbot::agent::Orchestrator;
use ragbot::api::ApiState;
use ragbot::config::Config;
use ragbot::conversation::{ChannelHistory, ContextSynthesizer};
use ragbot::llm::{BackendSet, HostedBackend, LocalBackend};
use ragbot::messaging::{DiscordAdapter, MessagingManager};
use ragbot::retrieval::{HttpRetrievalStore, RetrievalStore};
use ragbot::search::{BraveSearch, SearchAugmenter};
use ragbot::{InboundMessage, OutboundResponse, ProviderPreference, StatusUpdate};

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt as _;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ragbot")]
#[command(version, about = "Chat gateway over local and hosted language models with document retrieval")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Backend selection: auto, local, hosted, or dummy
    #[arg(long)]
    provider: Option<ProviderPreference>,

    /// Enable live web search for the hosted backend
    #[arg(long)]
    search: bool,

    /// Enable document retrieval
    #[arg(long)]
    rag: bool,

    /// Run the Discord bot alongside the HTTP server
    #[arg(long)]
    discord: bool,

    /// HTTP port, overriding the configured bind address
    #[arg(short, long)]
    port: Option<u16>,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(port) = self.port {
            config.bind.set_port(port);
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        config.search.enabled |= self.search;
        config.rag.enabled |= self.rag;
        config.discord.enabled |= self.discord;
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| Config::default_config_path().filter(|path| path.is_file()));
    let mut config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration from environment")?,
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let _log_guard = ragbot::logging::init_tracing(cli.debug, config.log_dir.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        bind = %config.bind,
        provider = %config.provider,
        search = config.search.enabled,
        rag = config.rag.enabled,
        discord = config.discord.enabled,
        "starting ragbot"
    );

    let search = if config.search.enabled {
        let brave = BraveSearch::new(&config.search).context("failed to build search client")?;
        let augmenter = Arc::new(SearchAugmenter::new(
            Arc::new(brave),
            config.search.enabled,
            config.search.max_results,
        ));
        if !augmenter.is_configured() {
            tracing::warn!("web search enabled but BRAVE_SEARCH_API_KEY is not set");
        }
        Some(augmenter)
    } else {
        None
    };

    let local = LocalBackend::new(&config.local).context("failed to build local backend")?;
    let hosted = HostedBackend::new(&config.hosted, search.clone())
        .context("failed to build hosted backend")?;
    let backends = BackendSet::new(Arc::new(local), Arc::new(hosted));

    let store: Option<Arc<dyn RetrievalStore>> = if config.rag.enabled {
        let store = HttpRetrievalStore::new(&config.rag).context("failed to build retrieval client")?;
        Some(Arc::new(store))
    } else {
        None
    };
    let synthesizer =
        ContextSynthesizer::new(store, config.rag.top_k, config.rag.illustrative_context);

    let channel_history = Arc::new(ChannelHistory::new());
    let mut orchestrator = Orchestrator::new(
        backends,
        synthesizer,
        config.provider,
        channel_history.clone(),
        config.rag.top_k,
    );
    if let Some(search) = search {
        orchestrator = orchestrator.with_search(search);
    }
    let orchestrator = Arc::new(orchestrator);
    orchestrator.initialize().await;

    if config.rag.enabled && config.rag.index_on_startup {
        let orchestrator = orchestrator.clone();
        let data_path = config.rag.data_path.clone();
        tokio::spawn(async move {
            match orchestrator.index_documents(&data_path).await {
                Ok(report) => tracing::info!(
                    path = %data_path.display(),
                    files = report.files_indexed,
                    chunks = report.chunks,
                    failed_chunks = report.failed_chunks,
                    "startup indexing finished"
                ),
                Err(error) => tracing::warn!(%error, "startup indexing failed"),
            }
        });
    }

    let messaging = if config.discord.enabled {
        let token = config.validate_discord()?;
        let mut manager = MessagingManager::new();
        manager.register(DiscordAdapter::new(
            token,
            &config.discord,
            config.rag.enabled,
            channel_history,
        ));
        let manager = Arc::new(manager);
        let inbound = manager
            .start_all()
            .await
            .context("failed to start messaging adapters")?;
        tokio::spawn(run_inbound_loop(inbound, manager.clone(), orchestrator.clone()));
        Some(manager)
    } else {
        None
    };

    let mut state = ApiState::new(orchestrator.clone(), config.rag.data_path.clone());
    if let Some(manager) = &messaging {
        state = state.with_messaging(manager.clone());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = ragbot::api::start_http_server(config.bind, Arc::new(state), shutdown_rx)
        .await
        .with_context(|| format!("failed to bind HTTP server to {}", config.bind))?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    shutdown_tx.send(true).ok();
    if let Some(manager) = &messaging {
        manager.shutdown_all().await;
    }
    if let Err(error) = server.await {
        tracing::warn!(%error, "HTTP server task failed");
    }

    tracing::info!("ragbot stopped");
    Ok(())
}

/// Answer every inbound chat message on its own task.
async fn run_inbound_loop(
    mut inbound: ragbot::messaging::traits::InboundStream,
    manager: Arc<MessagingManager>,
    orchestrator: Arc<Orchestrator>,
) {
    while let Some(message) = inbound.next().await {
        let manager = manager.clone();
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            answer(&manager, &orchestrator, message).await;
        });
    }
    tracing::info!("inbound message stream ended");
}

async fn answer(manager: &MessagingManager, orchestrator: &Orchestrator, message: InboundMessage) {
    if let Err(error) = manager.send_status(&message, StatusUpdate::Thinking).await {
        tracing::debug!(%error, "failed to send typing status");
    }

    let response = orchestrator
        .process_message(&message.content, &message.conversation_id, message.history.clone())
        .await;

    tracing::info!(
        source = %message.source,
        session_id = %message.conversation_id,
        provider = %response.provider,
        "chat message answered"
    );

    if let Err(error) = manager
        .respond(&message, OutboundResponse::Text(response.message))
        .await
    {
        tracing::warn!(%error, source = %message.source, "failed to deliver reply");
    }
}
