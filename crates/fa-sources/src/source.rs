//! Source and sink capability traits

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::SourceResult;
use crate::health::SourceHealth;
use crate::validation::ValidationResult;

/// Receiver of raw events, implemented by the event processor
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hand over one event; errors are absorbed by the sink
    async fn process_event(&self, source_id: &str, data: Value);

    /// Make a source's health record visible for diagnostics
    fn register_health(&self, health: Arc<SourceHealth>);
}

/// A producer of events
#[async_trait]
pub trait EventSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// Start producing events into `sink`
    async fn start(&self, sink: Arc<dyn EventSink>) -> SourceResult<()>;

    /// Stop producing events and cancel background work
    async fn stop(&self) -> SourceResult<()>;

    fn supports_validation(&self) -> bool {
        false
    }

    /// Check listener match conditions against what this source can emit
    async fn validate_match_conditions(
        &self,
        _conditions: &Map<String, Value>,
    ) -> SourceResult<ValidationResult> {
        let mut result = ValidationResult::ok();
        result.add_warning(format!(
            "Source '{}' does not support match condition validation",
            self.source_id()
        ));
        Ok(result)
    }

    /// Whether processed events from this source go to the event log
    fn persist_events(&self) -> bool {
        false
    }
}
