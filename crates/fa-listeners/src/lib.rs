//! Event listener records and their persistence
//!
//! - [`EventListener`]: a rule binding a source, a condition and an action
//! - [`ListenerStore`]: CRUD plus the read/trigger hooks used by the processor
//! - [`JsonListenerStore`] / [`MemoryListenerStore`]: implementations
//! - [`EventLog`]: audit trail for sources that persist their events

mod event_log;
mod json_store;
mod memory;
mod model;
mod storage;
mod store;

pub use event_log::{EventLog, MemoryEventLog, StoredEvent};
pub use json_store::{JsonListenerStore, STORAGE_KEY};
pub use memory::MemoryListenerStore;
pub use model::{ActionType, EventListener, ListenerFilter, ListenerUpdate, NewListener};
pub use storage::{Storage, StorageFile};
pub use store::{ListenerStore, StoreError, StoreResult};
