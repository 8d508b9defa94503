//! Shared state for the HTTP API.

use crate::agent::Orchestrator;
use crate::messaging::MessagingManager;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// State handed to every handler.
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    /// Present when a chat platform adapter is running.
    pub messaging_manager: Option<Arc<MessagingManager>>,
    /// Directory indexed by `POST /api/documents/index`.
    pub data_path: PathBuf,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, data_path: PathBuf) -> Self {
        Self {
            orchestrator,
            messaging_manager: None,
            data_path,
            started_at: Instant::now(),
        }
    }

    pub fn with_messaging(mut self, manager: Arc<MessagingManager>) -> Self {
        self.messaging_manager = Some(manager);
        self
    }
}
