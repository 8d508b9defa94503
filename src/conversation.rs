//! Conversation context: prompt assembly and recent channel history.

pub mod context;
pub mod history;
pub mod prompt;

pub use context::ContextSynthesizer;
pub use history::{ChannelHistory, ChannelMessage, HistoryStats};
