//! The orchestrator that turns a message into a reply.

pub mod orchestrator;
pub mod status;

pub use orchestrator::{DocumentQuery, Orchestrator};
pub use status::{ProviderStatus, RagStatus, StatusReport};
