//! Audit log of events from sources that opt into persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fa_core::Event;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::store::StoreResult;

/// A recorded event together with the listeners it triggered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Context id of the event
    pub id: String,
    pub source_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub triggered_listener_ids: Vec<String>,
}

/// Event audit log
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: &Event, triggered_listener_ids: Vec<String>) -> StoreResult<()>;

    /// Most recent events first, optionally restricted to one source
    async fn recent(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<StoredEvent>>;
}

/// Bounded in-memory event log; the oldest entries are evicted
pub struct MemoryEventLog {
    capacity: usize,
    events: RwLock<VecDeque<StoredEvent>>,
}

impl MemoryEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: RwLock::new(VecDeque::new()),
        }
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: &Event, triggered_listener_ids: Vec<String>) -> StoreResult<()> {
        let mut events = self.events.write().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(StoredEvent {
            id: event.context.id.clone(),
            source_id: event.source_id.clone(),
            data: event.data.clone(),
            timestamp: event.time_fired,
            triggered_listener_ids,
        });
        Ok(())
    }

    async fn recent(&self, source_id: Option<&str>, limit: usize) -> StoreResult<Vec<StoredEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .filter(|e| source_id.map_or(true, |s| e.source_id == s))
            .take(limit)
            .cloned()
            .collect())
    }
}
