//! Listener persistence interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{EventListener, ListenerFilter, ListenerUpdate, NewListener};

/// Listener store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event listener not found: {id}")]
    NotFound { id: String },

    #[error("an event listener named '{name}' already exists in this conversation")]
    DuplicateName { name: String, conversation_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported storage version for {key}: found {found}, newest known is {supported}")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted listener rules
///
/// The processor only reads through [`ListenerStore::list_enabled`] and
/// reports back with [`ListenerStore::record_trigger`] and
/// [`ListenerStore::set_enabled`]; everything else serves listener
/// management.
#[async_trait]
pub trait ListenerStore: Send + Sync {
    /// Create a listener; names are unique per conversation
    async fn create(&self, new: NewListener) -> StoreResult<EventListener>;

    async fn get(&self, id: &str) -> StoreResult<Option<EventListener>>;

    /// Apply a partial update
    async fn update(&self, id: &str, update: ListenerUpdate) -> StoreResult<EventListener>;

    /// Delete a listener, returning whether it existed
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Listeners matching `filter`, oldest first
    async fn list(&self, filter: &ListenerFilter) -> StoreResult<Vec<EventListener>>;

    /// All enabled listeners across sources
    async fn list_enabled(&self) -> StoreResult<Vec<EventListener>> {
        self.list(&ListenerFilter {
            enabled: Some(true),
            ..ListenerFilter::default()
        })
        .await
    }

    /// Record a successful trigger
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    async fn set_enabled(&self, id: &str, enabled: bool) -> StoreResult<EventListener> {
        self.update(
            id,
            ListenerUpdate {
                enabled: Some(enabled),
                ..ListenerUpdate::default()
            },
        )
        .await
    }
}
