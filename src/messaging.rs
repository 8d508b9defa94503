//! Messaging adapters. Discord is the only chat platform.

pub mod discord;
pub mod manager;
pub mod traits;

pub use discord::DiscordAdapter;
pub use manager::MessagingManager;
pub use traits::Messaging;
