//! Listener store persisted to a JSON file

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::memory::MemoryListenerStore;
use crate::model::{EventListener, ListenerFilter, ListenerUpdate, NewListener};
use crate::storage::{Storage, StorageFile};
use crate::store::{ListenerStore, StoreResult};

/// Storage key of the listener file
pub const STORAGE_KEY: &str = "event_listeners";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ListenerData {
    listeners: Vec<EventListener>,
}

/// Listener store backed by `<storage>/event_listeners`
///
/// Records live in memory and every mutation rewrites the file atomically.
/// A mutation whose write fails is undone in memory, so what is served
/// always matches what is on disk.
pub struct JsonListenerStore {
    storage: Storage,
    listeners: MemoryListenerStore,
    /// Held for a whole mutate-then-write step
    write_lock: Mutex<()>,
}

impl JsonListenerStore {
    /// Open the store, loading existing listeners
    pub async fn open(storage: Storage) -> StoreResult<Self> {
        let data: ListenerData = storage
            .load(STORAGE_KEY, STORAGE_VERSION, STORAGE_MINOR_VERSION)
            .await?
            .unwrap_or_default();

        info!(
            "Loading {} event listeners from {:?}",
            data.listeners.len(),
            storage.file_path(STORAGE_KEY)
        );

        Ok(Self {
            storage,
            listeners: MemoryListenerStore::from_listeners(data.listeners),
            write_lock: Mutex::new(()),
        })
    }

    /// Caller holds `write_lock`
    async fn save(&self) -> StoreResult<()> {
        let file = StorageFile {
            version: STORAGE_VERSION,
            minor_version: STORAGE_MINOR_VERSION,
            key: STORAGE_KEY.to_string(),
            data: ListenerData {
                listeners: self.listeners.snapshot(),
            },
        };
        self.storage.save(&file).await?;
        debug!("Saved {} event listeners", self.listeners.len());
        Ok(())
    }

    /// Write the file; on failure run `undo` against the in-memory records
    async fn save_or(&self, undo: impl FnOnce(&MemoryListenerStore)) -> StoreResult<()> {
        if let Err(e) = self.save().await {
            warn!(error = %e, "Could not write event listeners, change rolled back");
            undo(&self.listeners);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl ListenerStore for JsonListenerStore {
    async fn create(&self, new: NewListener) -> StoreResult<EventListener> {
        let _guard = self.write_lock.lock().await;
        let listener = self.listeners.insert_new(new, Utc::now())?;
        self.save_or(|memory| {
            memory.remove(&listener.id);
        })
        .await?;
        Ok(listener)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<EventListener>> {
        Ok(self.listeners.current(id))
    }

    async fn update(&self, id: &str, update: ListenerUpdate) -> StoreResult<EventListener> {
        let _guard = self.write_lock.lock().await;
        let previous = self.listeners.current(id);
        let (listener, changed) = self.listeners.apply_update(id, &update, Utc::now())?;
        if changed {
            self.save_or(|memory| {
                if let Some(previous) = previous {
                    memory.restore(previous);
                }
            })
            .await?;
        }
        Ok(listener)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(removed) = self.listeners.remove(id) else {
            return Ok(false);
        };
        self.save_or(|memory| memory.restore((*removed).clone()))
            .await?;
        Ok(true)
    }

    async fn list(&self, filter: &ListenerFilter) -> StoreResult<Vec<EventListener>> {
        self.listeners.list(filter).await
    }

    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let previous = self.listeners.current(id);
        self.listeners.mark_triggered(id, at)?;
        self.save_or(|memory| {
            if let Some(previous) = previous {
                memory.restore(previous);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionType;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_listeners_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join(".storage"));

        let store = JsonListenerStore::open(storage.clone()).await.unwrap();
        let created = store
            .create(
                NewListener::new("doc indexed", "indexing", "c1")
                    .with_condition("document_type", "pdf")
                    .with_action(ActionType::Script, json!({"script_code": "return true"})),
            )
            .await
            .unwrap();
        store.record_trigger(&created.id, Utc::now()).await.unwrap();
        drop(store);

        let reopened = JsonListenerStore::open(storage).await.unwrap();
        let loaded = reopened.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "doc indexed");
        assert_eq!(loaded.trigger_count, 1);
        assert_eq!(loaded.action_type, ActionType::Script);
    }

    #[tokio::test]
    async fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let store = JsonListenerStore::open(storage.clone()).await.unwrap();
        store
            .create(NewListener::new("a", "webhook", "c1"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(storage.file_path(STORAGE_KEY)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["key"], STORAGE_KEY);
        assert_eq!(value["data"]["listeners"][0]["name"], "a");
        assert_eq!(value["data"]["listeners"][0]["action_type"], "wake_llm");
    }

    #[tokio::test]
    async fn test_delete_persists() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let store = JsonListenerStore::open(storage.clone()).await.unwrap();
        let listener = store
            .create(NewListener::new("a", "webhook", "c1"))
            .await
            .unwrap();
        assert!(store.delete(&listener.id).await.unwrap());
        drop(store);

        let reopened = JsonListenerStore::open(storage).await.unwrap();
        assert!(reopened
            .list(&ListenerFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let storage_dir = dir.path().join("store");
        let store = JsonListenerStore::open(Storage::new(&storage_dir))
            .await
            .unwrap();
        let kept = store
            .create(NewListener::new("kept", "webhook", "c1"))
            .await
            .unwrap();

        // A plain file where the directory should be makes every write fail
        std::fs::remove_dir_all(&storage_dir).unwrap();
        std::fs::write(&storage_dir, "not a directory").unwrap();

        assert!(store
            .create(NewListener::new("lost", "webhook", "c1"))
            .await
            .is_err());
        let rename = ListenerUpdate {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        assert!(store.update(&kept.id, rename).await.is_err());
        assert!(store.record_trigger(&kept.id, Utc::now()).await.is_err());
        assert!(store.delete(&kept.id).await.is_err());

        let listed = store.list(&ListenerFilter::default()).await.unwrap();
        assert_eq!(listed, vec![kept.clone()]);

        std::fs::remove_file(&storage_dir).unwrap();
        let retried = store
            .create(NewListener::new("lost", "webhook", "c1"))
            .await
            .unwrap();
        assert_eq!(retried.name, "lost");
        let renamed = ListenerUpdate {
            name: Some("kept".to_string()),
            ..Default::default()
        };
        assert!(store.update(&retried.id, renamed).await.is_err());
    }
}
