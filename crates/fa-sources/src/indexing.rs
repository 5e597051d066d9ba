//! Completion notifications from the document indexing pipeline

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::SourceResult;
use crate::passive::PassiveChannel;
use crate::source::{EventSink, EventSource};

/// A document that finished indexing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// e.g. `pdf`, `email`, `note`
    pub document_type: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

/// Source for indexing pipeline events; its events are kept in the event log
pub struct IndexingSource {
    channel: PassiveChannel,
}

impl IndexingSource {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            channel: PassiveChannel::new(source_id),
        }
    }

    pub async fn document_indexed(&self, document: IndexedDocument) -> SourceResult<()> {
        let mut data = serde_json::to_value(&document)?;
        if let Value::Object(map) = &mut data {
            map.insert("event_type".to_string(), json!("document_indexed"));
            map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        }
        self.channel.send(data).await
    }

    pub async fn indexing_failed(&self, document_id: &str, error: &str) -> SourceResult<()> {
        self.channel
            .send(json!({
                "event_type": "indexing_failed",
                "document_id": document_id,
                "error": error,
                "timestamp": Utc::now().to_rfc3339(),
            }))
            .await
    }
}

impl Default for IndexingSource {
    fn default() -> Self {
        Self::new(fa_core::sources::INDEXING)
    }
}

#[async_trait]
impl EventSource for IndexingSource {
    fn source_id(&self) -> &str {
        self.channel.source_id()
    }

    async fn start(&self, sink: Arc<dyn EventSink>) -> SourceResult<()> {
        self.channel.start(sink).await
    }

    async fn stop(&self) -> SourceResult<()> {
        self.channel.stop().await
    }

    fn persist_events(&self) -> bool {
        true
    }
}
