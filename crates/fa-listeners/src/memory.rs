//! In-memory listener store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{EventListener, ListenerFilter, ListenerUpdate, NewListener};
use crate::store::{ListenerStore, StoreError, StoreResult};

type NameKey = (String, String);

fn name_key(listener: &EventListener) -> NameKey {
    (listener.conversation_id.clone(), listener.name.clone())
}

/// `DashMap`-backed listener store
///
/// Entries are stored as `Arc<EventListener>` so reads never clone the
/// whole record under a shard lock.
#[derive(Default)]
pub struct MemoryListenerStore {
    /// Primary index: listener id -> listener
    by_id: DashMap<String, Arc<EventListener>>,

    /// Index: (conversation_id, name) -> listener id
    by_name: DashMap<NameKey, String>,
}

impl MemoryListenerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from previously persisted records
    pub fn from_listeners(listeners: impl IntoIterator<Item = EventListener>) -> Self {
        let store = Self::new();
        for listener in listeners {
            store.by_name.insert(name_key(&listener), listener.id.clone());
            store.by_id.insert(listener.id.clone(), Arc::new(listener));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Snapshot of every listener, oldest first
    pub fn snapshot(&self) -> Vec<EventListener> {
        let mut all: Vec<EventListener> =
            self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub(crate) fn insert_new(
        &self,
        new: NewListener,
        now: DateTime<Utc>,
    ) -> StoreResult<EventListener> {
        let listener = EventListener::from_new(new, now);

        match self.by_name.entry(name_key(&listener)) {
            Entry::Occupied(_) => {
                return Err(StoreError::DuplicateName {
                    name: listener.name,
                    conversation_id: listener.conversation_id,
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(listener.id.clone());
            }
        }

        info!(
            listener_id = %listener.id,
            source_id = %listener.source_id,
            "Created event listener '{}'",
            listener.name
        );
        self.by_id
            .insert(listener.id.clone(), Arc::new(listener.clone()));
        Ok(listener)
    }

    pub(crate) fn apply_update(
        &self,
        id: &str,
        update: &ListenerUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<(EventListener, bool)> {
        // Remove first so the name index can be checked without holding a shard lock
        let (_, current) = self
            .by_id
            .remove(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let mut updated = (*current).clone();
        let changed = update.apply(&mut updated);

        if updated.name != current.name {
            match self.by_name.entry(name_key(&updated)) {
                Entry::Occupied(_) => {
                    self.by_id.insert(id.to_string(), current);
                    return Err(StoreError::DuplicateName {
                        name: updated.name,
                        conversation_id: updated.conversation_id,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(id.to_string());
                }
            }
            self.by_name.remove(&name_key(&current));
        }

        if changed {
            updated.updated_at = now;
            debug!(listener_id = %id, "Updated event listener");
        }
        self.by_id.insert(id.to_string(), Arc::new(updated.clone()));
        Ok((updated, changed))
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Arc<EventListener>> {
        let (_, listener) = self.by_id.remove(id)?;
        self.by_name.remove(&name_key(&listener));
        info!(listener_id = %id, "Deleted event listener '{}'", listener.name);
        Some(listener)
    }

    pub(crate) fn current(&self, id: &str) -> Option<EventListener> {
        self.by_id.get(id).map(|r| (**r.value()).clone())
    }

    /// Put a previous version of a listener back, including its name entry
    pub(crate) fn restore(&self, listener: EventListener) {
        if let Some((_, newer)) = self.by_id.remove(&listener.id) {
            self.by_name.remove(&name_key(&newer));
        }
        self.by_name.insert(name_key(&listener), listener.id.clone());
        self.by_id.insert(listener.id.clone(), Arc::new(listener));
    }

    pub(crate) fn mark_triggered(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut entry = self
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let listener = Arc::make_mut(entry.value_mut());
        listener.last_triggered = Some(at);
        listener.trigger_count += 1;
        Ok(())
    }
}

#[async_trait]
impl ListenerStore for MemoryListenerStore {
    async fn create(&self, new: NewListener) -> StoreResult<EventListener> {
        self.insert_new(new, Utc::now())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<EventListener>> {
        Ok(self.current(id))
    }

    async fn update(&self, id: &str, update: ListenerUpdate) -> StoreResult<EventListener> {
        self.apply_update(id, &update, Utc::now())
            .map(|(listener, _)| listener)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.remove(id).is_some())
    }

    async fn list(&self, filter: &ListenerFilter) -> StoreResult<Vec<EventListener>> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|listener| filter.matches(listener))
            .collect())
    }

    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.mark_triggered(id, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionType;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryListenerStore::new();
        let created = store
            .create(
                NewListener::new("arrival", "home_assistant", "c1")
                    .with_condition("entity_id", "person.test"),
            )
            .await
            .unwrap();

        let loaded = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.match_conditions["entity_id"], json!("person.test"));
        assert_eq!(loaded.action_type, ActionType::WakeLlm);
    }

    #[tokio::test]
    async fn test_duplicate_name_per_conversation() {
        let store = MemoryListenerStore::new();
        store
            .create(NewListener::new("arrival", "webhook", "c1"))
            .await
            .unwrap();

        let err = store
            .create(NewListener::new("arrival", "webhook", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName { .. }));

        // Same name in another conversation is fine
        store
            .create(NewListener::new("arrival", "webhook", "c2"))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_rename_conflict_keeps_original() {
        let store = MemoryListenerStore::new();
        let a = store.create(NewListener::new("a", "webhook", "c1")).await.unwrap();
        store.create(NewListener::new("b", "webhook", "c1")).await.unwrap();

        let err = store
            .update(
                &a.id,
                ListenerUpdate {
                    name: Some("b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName { .. }));
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().name, "a");

        let renamed = store
            .update(
                &a.id,
                ListenerUpdate {
                    name: Some("c".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "c");
        // Old name is free again
        store.create(NewListener::new("a", "webhook", "c1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_trigger_and_disable() {
        let store = MemoryListenerStore::new();
        let listener = store
            .create(NewListener::new("once", "webhook", "c1").one_time())
            .await
            .unwrap();

        let at = Utc::now();
        store.record_trigger(&listener.id, at).await.unwrap();
        store.record_trigger(&listener.id, at).await.unwrap();
        let disabled = store.set_enabled(&listener.id, false).await.unwrap();
        assert!(!disabled.enabled);
        assert_eq!(disabled.trigger_count, 2);
        assert_eq!(disabled.last_triggered, Some(at));

        assert!(store.list_enabled().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let store = MemoryListenerStore::new();
        assert!(!store.delete("nope").await.unwrap());
        assert!(matches!(
            store.record_trigger("nope", Utc::now()).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
