use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::SourceResult;
use crate::passive::PassiveChannel;
use crate::source::{EventSink, EventSource};

/// Passive source fed by HTTP webhook requests
pub struct WebhookSource {
    channel: PassiveChannel,
}

impl WebhookSource {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            channel: PassiveChannel::new(source_id),
        }
    }

    /// Queue a pushed payload for processing
    pub async fn push(&self, data: Value) -> SourceResult<()> {
        self.channel.send(data).await
    }
}

impl Default for WebhookSource {
    fn default() -> Self {
        Self::new(fa_core::sources::WEBHOOK)
    }
}

#[async_trait]
impl EventSource for WebhookSource {
    fn source_id(&self) -> &str {
        self.channel.source_id()
    }

    async fn start(&self, sink: Arc<dyn EventSink>) -> SourceResult<()> {
        self.channel.start(sink).await
    }

    async fn stop(&self) -> SourceResult<()> {
        self.channel.stop().await
    }
}
