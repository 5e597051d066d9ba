//! Event envelope passed from sources to the processor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path;
use crate::Context;

/// An event produced by a source
///
/// The payload is kept as a loosely structured JSON value: Home Assistant
/// state changes, webhook bodies and indexing notifications share nothing
/// beyond being JSON objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Source that produced the event
    pub source_id: String,

    /// Event payload
    pub data: serde_json::Value,

    /// When the event was received
    pub time_fired: DateTime<Utc>,

    /// Causality context
    pub context: Context,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(source_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            source_id: source_id.into(),
            data,
            time_fired: Utc::now(),
            context: Context::new(),
        }
    }

    /// Look up a dotted path in the payload
    pub fn get(&self, path: &str) -> Option<&serde_json::Value> {
        path::lookup(&self.data, path)
    }

    /// Entity id of a state-change payload, if present
    pub fn entity_id(&self) -> Option<&str> {
        self.get("entity_id").and_then(|v| v.as_str())
    }

    /// Payload as seen by scripts: the data plus `source_id` and `timestamp`
    /// when the payload does not already carry them
    pub fn script_view(&self) -> serde_json::Value {
        match &self.data {
            serde_json::Value::Object(map) => {
                let mut map = map.clone();
                map.entry("source_id")
                    .or_insert_with(|| serde_json::Value::String(self.source_id.clone()));
                map.entry("timestamp")
                    .or_insert_with(|| serde_json::Value::String(self.time_fired.to_rfc3339()));
                serde_json::Value::Object(map)
            }
            other => other.clone(),
        }
    }
}
