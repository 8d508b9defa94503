//! Discord messaging adapter using serenity.

use crate::config::DiscordConfig;
use crate::conversation::{ChannelHistory, ChannelMessage};
use crate::error::MessagingError;
use crate::messaging::traits::{InboundStream, Messaging};
use crate::{HistoryEntry, InboundMessage, OutboundResponse, Role, StatusUpdate};

use anyhow::Context as _;
use serenity::all::{
    ChannelId, Context, EventHandler, GatewayIntents, GetMessages, Http, Message as DiscordMessage,
    Ready, ShardManager,
};
use serenity::Client;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

/// Hard Discord limit per message.
const MAX_MESSAGE_LENGTH: usize = 2000;

/// Chunk size for long replies, leaving room for continuation markers.
const CHUNK_LENGTH: usize = 1900;

/// Pause between chunks of one reply.
const CHUNK_DELAY: Duration = Duration::from_millis(200);

/// Channel messages fetched as conversation history.
const HISTORY_FETCH_LIMIT: u8 = 10;

/// Messages shorter than this carry no useful context.
const MIN_HISTORY_CHARS: usize = 10;

/// Discord adapter state.
pub struct DiscordAdapter {
    token: String,
    command_prefix: String,
    fetch_history: bool,
    channel_history: Arc<ChannelHistory>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    shard_manager: Arc<RwLock<Option<Arc<ShardManager>>>>,
}

impl DiscordAdapter {
    /// `fetch_history` pulls recent channel messages into each request;
    /// it is on when document retrieval is enabled.
    pub fn new(
        token: impl Into<String>,
        config: &DiscordConfig,
        fetch_history: bool,
        channel_history: Arc<ChannelHistory>,
    ) -> Self {
        Self {
            token: token.into(),
            command_prefix: config.command_prefix.clone(),
            fetch_history,
            channel_history,
            http: Arc::new(RwLock::new(None)),
            shard_manager: Arc::new(RwLock::new(None)),
        }
    }

    async fn http(&self) -> crate::Result<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| MessagingError::NotConnected("discord".into()).into())
    }
}

fn channel_id(message: &InboundMessage) -> anyhow::Result<ChannelId> {
    let raw = message
        .metadata
        .get("discord_channel_id")
        .and_then(|value| value.as_str())
        .context("missing discord_channel_id in metadata")?;
    let id: u64 = raw.parse().context("invalid discord channel id")?;
    anyhow::ensure!(id != 0, "discord channel id is zero");
    Ok(ChannelId::new(id))
}

impl Messaging for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let handler = Handler {
            inbound_tx,
            command_prefix: self.command_prefix.clone(),
            fetch_history: self.fetch_history,
            channel_history: self.channel_history.clone(),
        };

        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(&self.token, intents)
            .event_handler(handler)
            .await
            .context("failed to build discord client")?;

        *self.http.write().await = Some(client.http.clone());
        *self.shard_manager.write().await = Some(client.shard_manager.clone());

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                tracing::error!(%error, "discord gateway connection ended with error");
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn respond(&self, message: &InboundMessage, response: OutboundResponse) -> crate::Result<()> {
        let http = self.http().await?;
        let channel_id = channel_id(message)?;

        match response {
            OutboundResponse::Text(text) => {
                let chunks = split_message(&text);
                let last = chunks.len().saturating_sub(1);
                for (index, chunk) in chunks.into_iter().enumerate() {
                    channel_id
                        .say(&*http, chunk)
                        .await
                        .map_err(|error| MessagingError::SendFailed(error.to_string()))?;
                    if index < last {
                        tokio::time::sleep(CHUNK_DELAY).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn send_status(&self, message: &InboundMessage, status: StatusUpdate) -> crate::Result<()> {
        match status {
            StatusUpdate::Thinking => {
                let http = self.http().await?;
                let channel_id = channel_id(message)?;
                // Typing lasts ~10s or until the bot posts; failure is cosmetic.
                if let Err(error) = channel_id.broadcast_typing(&*http).await {
                    tracing::debug!(%error, "failed to start discord typing indicator");
                }
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> crate::Result<()> {
        let http = self.http().await?;
        http.get_current_user()
            .await
            .context("discord api unreachable")?;
        Ok(())
    }

    async fn shutdown(&self) -> crate::Result<()> {
        if let Some(shard_manager) = self.shard_manager.write().await.take() {
            shard_manager.shutdown_all().await;
        }
        *self.http.write().await = None;

        tracing::info!("discord adapter shut down");
        Ok(())
    }
}

struct Handler {
    inbound_tx: mpsc::Sender<InboundMessage>,
    command_prefix: String,
    fetch_history: bool,
    channel_history: Arc<ChannelHistory>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            bot = %ready.user.name,
            guilds = ready.guilds.len(),
            prefix = %self.command_prefix,
            "discord connected"
        );
    }

    async fn message(&self, ctx: Context, message: DiscordMessage) {
        let channel_key = message.channel_id.to_string();
        self.channel_history
            .record(&channel_key, channel_message(&message))
            .await;

        if message.author.bot {
            return;
        }

        let Some(command) = parse_command(&message.content, &self.command_prefix) else {
            return;
        };

        if command.is_empty() {
            let hint = format!("Please provide a message after `{}`", self.command_prefix.trim());
            if let Err(error) = message.channel_id.say(&ctx.http, hint).await {
                tracing::warn!(%error, "failed to send discord usage hint");
            }
            return;
        }

        let history = if self.fetch_history {
            self.history_for(&ctx, &message).await
        } else {
            Vec::new()
        };

        tracing::info!(
            author = %message.author.name,
            channel_id = %channel_key,
            command_chars = command.chars().count(),
            "discord command received"
        );

        let inbound = inbound_message(
            message.id.to_string(),
            &message.author.id.to_string(),
            &channel_key,
            command,
            history,
            timestamp_of(&message),
        );

        if let Err(error) = self.inbound_tx.send(inbound).await {
            tracing::warn!(%error, "failed to forward discord message (receiver dropped)");
        }
    }
}

impl Handler {
    /// Recent channel messages before `message`, oldest first. Falls back to
    /// the in-memory ring buffer when the fetch fails.
    async fn history_for(&self, ctx: &Context, message: &DiscordMessage) -> Vec<HistoryEntry> {
        let request = GetMessages::new().before(message.id).limit(HISTORY_FETCH_LIMIT);
        match message.channel_id.messages(&ctx.http, request).await {
            Ok(mut fetched) => {
                // Discord returns newest first.
                fetched.reverse();
                let observed: Vec<ChannelMessage> = fetched.iter().map(channel_message).collect();
                history_from_messages(&observed, &self.command_prefix)
            }
            Err(error) => {
                tracing::warn!(%error, "failed to fetch discord channel history, using buffered messages");
                let buffered: Vec<ChannelMessage> = self
                    .channel_history
                    .recent(&message.channel_id.to_string())
                    .await
                    .into_iter()
                    .filter(|buffered| buffered.id != message.id.to_string())
                    .collect();
                history_from_messages(&buffered, &self.command_prefix)
            }
        }
    }
}

/// Inbound message for one prefixed command. The session id is scoped to
/// author and channel; replies are routed by the channel id in metadata.
fn inbound_message(
    id: String,
    author_id: &str,
    channel_key: &str,
    command: &str,
    history: Vec<HistoryEntry>,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> InboundMessage {
    let mut metadata = HashMap::new();
    metadata.insert(
        "discord_channel_id".into(),
        serde_json::Value::String(channel_key.to_string()),
    );

    InboundMessage {
        id,
        source: "discord".into(),
        conversation_id: format!("discord_{author_id}_{channel_key}"),
        content: command.to_string(),
        history,
        timestamp,
        metadata,
    }
}

fn timestamp_of(message: &DiscordMessage) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0).unwrap_or_else(chrono::Utc::now)
}

fn channel_message(message: &DiscordMessage) -> ChannelMessage {
    ChannelMessage {
        id: message.id.to_string(),
        author: message.author.name.clone(),
        content: message.content.clone(),
        is_bot: message.author.bot,
        timestamp: timestamp_of(message),
    }
}

/// Command text after the prefix, trimmed. `None` when the prefix is absent.
fn parse_command<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    content.strip_prefix(prefix).map(str::trim)
}

/// Turn chronological channel messages into conversation history: commands
/// and short messages are dropped, bot messages become assistant turns, and
/// human messages are prefixed with the author name.
fn history_from_messages(messages: &[ChannelMessage], command_prefix: &str) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter(|message| !message.content.starts_with(command_prefix))
        .filter(|message| message.content.trim().chars().count() >= MIN_HISTORY_CHARS)
        .map(|message| {
            let (role, content) = if message.is_bot {
                (Role::Assistant, message.content.clone())
            } else {
                (Role::User, format!("{}: {}", message.author, message.content))
            };
            HistoryEntry {
                role,
                content,
                timestamp: message.timestamp,
            }
        })
        .collect()
}

/// Split a reply for Discord. Replies within the limit go out whole; longer
/// ones are cut into chunks on word boundaries and marked as continued.
fn split_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return vec![text.to_string()];
    }

    let pieces = split_on_words(text, CHUNK_LENGTH);
    let last = pieces.len().saturating_sub(1);
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| {
            let mut chunk = if index > 0 {
                format!("...continued:\n{piece}")
            } else {
                piece
            };
            if index < last {
                chunk.push_str("\n...");
            }
            chunk
        })
        .collect()
}

/// Cut `text` into pieces of at most `max_chars` characters, preferring the
/// last space past the halfway point of each window.
fn split_on_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        let window_end = remaining
            .char_indices()
            .nth(max_chars)
            .map_or(remaining.len(), |(offset, _)| offset);
        let window = &remaining[..window_end];

        let split_at = window
            .rfind(' ')
            .filter(|&space| window[..space].chars().count() > max_chars / 2)
            .unwrap_or(window_end);

        pieces.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
        remaining = remaining.strip_prefix(' ').unwrap_or(remaining);
    }

    if !remaining.is_empty() {
        pieces.push(remaining.to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(author: &str, content: &str, is_bot: bool) -> ChannelMessage {
        ChannelMessage {
            id: content.len().to_string(),
            author: author.into(),
            content: content.into(),
            is_bot,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn commands_need_the_prefix() {
        assert_eq!(parse_command("!chat   what is rust ", "!chat "), Some("what is rust"));
        assert_eq!(parse_command("!chat ", "!chat "), Some(""));
        assert_eq!(parse_command("hello there", "!chat "), None);
    }

    #[test]
    fn history_drops_commands_and_short_messages() {
        let messages = vec![
            observed("ana", "!chat tell me about the docs", false),
            observed("ana", "ok", false),
            observed("ana", "we were talking about indexing", false),
            observed("ragbot", "Indexing splits files into chunks.", true),
        ];

        let history = history_from_messages(&messages, "!chat ");

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "ana: we were talking about indexing");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Indexing splits files into chunks.");
    }

    #[test]
    fn short_replies_are_sent_whole() {
        let text = "a".repeat(MAX_MESSAGE_LENGTH);
        assert_eq!(split_message(&text), vec![text]);
    }

    #[test]
    fn long_replies_are_chunked_with_markers() {
        let text = "word ".repeat(900);
        let chunks = split_message(text.trim_end());

        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= MAX_MESSAGE_LENGTH));
        assert!(!chunks[0].starts_with("...continued:"));
        assert!(chunks[0].ends_with("\n..."));
        assert!(chunks[1].starts_with("...continued:\n"));
        let last = chunks.last().unwrap();
        assert!(last.starts_with("...continued:\n"));
        assert!(!last.ends_with("\n..."));
    }

    #[test]
    fn word_split_prefers_spaces_and_keeps_every_word() {
        let text = "alpha beta gamma delta epsilon";
        let pieces = split_on_words(text, 12);
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 12));
        assert_eq!(pieces.join(" "), text);
    }

    #[test]
    fn unbroken_text_is_hard_cut() {
        let text = "x".repeat(25);
        let pieces = split_on_words(&text, 10);
        assert_eq!(pieces.iter().map(String::len).collect::<Vec<_>>(), vec![10, 10, 5]);
    }

    #[test]
    fn inbound_commands_route_back_by_channel() {
        let history = vec![HistoryEntry::new(Role::User, "earlier question here")];
        let inbound = inbound_message(
            "42".into(),
            "1001",
            "2002",
            "what is rust",
            history,
            chrono::Utc::now(),
        );

        assert_eq!(inbound.source, "discord");
        assert_eq!(inbound.conversation_id, "discord_1001_2002");
        assert_eq!(inbound.content, "what is rust");
        assert_eq!(inbound.history.len(), 1);
        assert_eq!(inbound.metadata.len(), 1);
        assert_eq!(channel_id(&inbound).unwrap(), ChannelId::new(2002));
    }

    #[test]
    fn replies_without_a_channel_are_rejected() {
        let mut inbound = inbound_message("1".into(), "7", "0", "hi", Vec::new(), chrono::Utc::now());
        assert!(channel_id(&inbound).is_err());

        inbound.metadata.clear();
        let error = channel_id(&inbound).unwrap_err();
        assert!(error.to_string().contains("discord_channel_id"));
    }
}
