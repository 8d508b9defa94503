//! MessagingManager: fan-in and routing for all adapters.

use crate::error::{MessagingError, Result};
use crate::messaging::traits::{InboundStream, Messaging, MessagingDyn};
use crate::{InboundMessage, OutboundResponse, StatusUpdate};

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every registered adapter and routes replies back by source name.
pub struct MessagingManager {
    adapters: HashMap<String, Arc<dyn MessagingDyn>>,
}

impl MessagingManager {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: impl Messaging) {
        let name = adapter.name().to_string();
        self.adapters.insert(name, Arc::new(adapter));
    }

    /// Start every adapter and merge their inbound streams. An adapter that
    /// fails to start is logged and left out.
    pub async fn start_all(&self) -> Result<InboundStream> {
        let mut streams = Vec::with_capacity(self.adapters.len());
        for (name, adapter) in &self.adapters {
            match adapter.start().await {
                Ok(stream) => {
                    tracing::info!(adapter = %name, "messaging adapter started");
                    streams.push(stream);
                }
                Err(error) => {
                    tracing::error!(adapter = %name, %error, "failed to start messaging adapter");
                }
            }
        }

        if streams.is_empty() && !self.adapters.is_empty() {
            return Err(anyhow::anyhow!("no messaging adapter could start").into());
        }

        Ok(Box::pin(futures::stream::select_all(streams)))
    }

    fn adapter_for(&self, message: &InboundMessage) -> Result<&Arc<dyn MessagingDyn>> {
        self.adapters
            .get(&message.source)
            .ok_or_else(|| MessagingError::UnknownAdapter(message.source.clone()).into())
    }

    pub async fn respond(&self, message: &InboundMessage, response: OutboundResponse) -> Result<()> {
        self.adapter_for(message)?.respond(message, response).await
    }

    pub async fn send_status(&self, message: &InboundMessage, status: StatusUpdate) -> Result<()> {
        self.adapter_for(message)?.send_status(message, status).await
    }

    /// Adapter name to health, `"ok"` or the error text.
    pub async fn health(&self) -> BTreeMap<String, String> {
        let mut report = BTreeMap::new();
        for (name, adapter) in &self.adapters {
            let state = match adapter.health_check().await {
                Ok(()) => "ok".to_string(),
                Err(error) => error.to_string(),
            };
            report.insert(name.clone(), state);
        }
        report
    }

    pub async fn shutdown_all(&self) {
        for (name, adapter) in &self.adapters {
            if let Err(error) = adapter.shutdown().await {
                tracing::warn!(adapter = %name, %error, "messaging adapter shutdown failed");
            }
        }
    }
}

impl Default for MessagingManager {
    fn default() -> Self {
        Self::new()
    }
}
