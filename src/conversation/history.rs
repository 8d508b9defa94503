//! Per-channel ring buffer of recently observed chat messages.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Messages kept per channel.
pub const CHANNEL_CAPACITY: usize = 10;

/// Messages this short carry no useful context.
const MIN_CONTEXT_CHARS: usize = 10;

/// A chat message seen in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub is_bot: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Ring buffer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub channels_tracked: usize,
    pub total_messages: usize,
}

/// Recent messages per channel, oldest evicted first.
///
/// Each buffer is stored oldest to newest and never holds more than
/// [`CHANNEL_CAPACITY`] entries.
#[derive(Debug, Default)]
pub struct ChannelHistory {
    channels: RwLock<HashMap<String, VecDeque<ChannelMessage>>>,
}

impl ChannelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, channel_id: &str, message: ChannelMessage) {
        let mut channels = self.channels.write().await;
        let buffer = channels
            .entry(channel_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(CHANNEL_CAPACITY));
        if buffer.len() == CHANNEL_CAPACITY {
            buffer.pop_front();
        }
        buffer.push_back(message);
    }

    /// Buffered messages for a channel, oldest first.
    pub async fn recent(&self, channel_id: &str) -> Vec<ChannelMessage> {
        self.channels
            .read()
            .await
            .get(channel_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Up to `limit` of the newest human messages worth quoting, formatted
    /// as `author: content`, oldest first.
    pub async fn context_snippets(&self, channel_id: &str, limit: usize) -> Vec<String> {
        let channels = self.channels.read().await;
        let Some(buffer) = channels.get(channel_id) else {
            return Vec::new();
        };

        let mut snippets: Vec<String> = buffer
            .iter()
            .rev()
            .take(limit)
            .filter(|message| !message.is_bot && message.content.trim().chars().count() > MIN_CONTEXT_CHARS)
            .map(|message| format!("{}: {}", message.author, message.content))
            .collect();
        snippets.reverse();
        snippets
    }

    pub async fn stats(&self) -> HistoryStats {
        let channels = self.channels.read().await;
        HistoryStats {
            channels_tracked: channels.len(),
            total_messages: channels.values().map(VecDeque::len).sum(),
        }
    }
}
