//! Per-source listener cache
//!
//! The cache is rebuilt wholesale from the store and swapped in behind an
//! `Arc`; readers clone the pointer and never block a refresh.

use chrono::{DateTime, Utc};
use fa_listeners::EventListener;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub(crate) struct CacheSnapshot {
    /// `None` until the first load and after invalidation
    loaded_at: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
    by_source: HashMap<String, Vec<Arc<EventListener>>>,
}

impl CacheSnapshot {
    fn build(listeners: Vec<EventListener>) -> Self {
        let mut by_source: HashMap<String, Vec<Arc<EventListener>>> = HashMap::new();
        for listener in listeners.into_iter().filter(|l| l.enabled) {
            by_source
                .entry(listener.source_id.clone())
                .or_default()
                .push(Arc::new(listener));
        }
        Self {
            loaded_at: Some(Instant::now()),
            refreshed_at: Some(Utc::now()),
            by_source,
        }
    }

    pub(crate) fn listeners_for(&self, source_id: &str) -> Vec<Arc<EventListener>> {
        self.by_source.get(source_id).cloned().unwrap_or_default()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub(crate) fn source_count(&self) -> usize {
        self.by_source.len()
    }

    pub(crate) fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

pub(crate) struct ListenerCache {
    ttl: Duration,
    snapshot: RwLock<Arc<CacheSnapshot>>,
}

impl ListenerCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: RwLock::new(Arc::new(CacheSnapshot::default())),
        }
    }

    pub(crate) async fn current(&self) -> Arc<CacheSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub(crate) async fn is_stale(&self) -> bool {
        match self.snapshot.read().await.loaded_at {
            Some(loaded_at) => loaded_at.elapsed() >= self.ttl,
            None => true,
        }
    }

    pub(crate) async fn replace(&self, listeners: Vec<EventListener>) -> Arc<CacheSnapshot> {
        let snapshot = Arc::new(CacheSnapshot::build(listeners));
        *self.snapshot.write().await = snapshot.clone();
        snapshot
    }

    /// Keep serving the current listeners but reload on next access
    pub(crate) async fn invalidate(&self) {
        let mut guard = self.snapshot.write().await;
        if guard.loaded_at.is_some() {
            *guard = Arc::new(CacheSnapshot {
                loaded_at: None,
                refreshed_at: guard.refreshed_at,
                by_source: guard.by_source.clone(),
            });
        }
    }

    pub(crate) async fn clear(&self) {
        *self.snapshot.write().await = Arc::new(CacheSnapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fa_listeners::NewListener;

    fn listener(name: &str, source: &str, enabled: bool) -> EventListener {
        let mut new = NewListener::new(name, source, "c1");
        new.enabled = enabled;
        EventListener::from_new(new, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_staleness() {
        let cache = ListenerCache::new(Duration::from_secs(60));
        assert!(cache.is_stale().await);

        cache.replace(vec![listener("a", "webhook", true)]).await;
        assert!(!cache.is_stale().await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.is_stale().await);
    }

    #[tokio::test]
    async fn test_groups_enabled_listeners_by_source() {
        let cache = ListenerCache::new(Duration::from_secs(60));
        let snapshot = cache
            .replace(vec![
                listener("a", "webhook", true),
                listener("b", "webhook", false),
                listener("c", "home_assistant", true),
            ])
            .await;

        assert_eq!(snapshot.listener_count(), 2);
        assert_eq!(snapshot.source_count(), 2);
        assert_eq!(snapshot.listeners_for("webhook")[0].name, "a");
        assert!(snapshot.listeners_for("indexing").is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_keeps_serving() {
        let cache = ListenerCache::new(Duration::from_secs(60));
        cache.replace(vec![listener("a", "webhook", true)]).await;
        cache.invalidate().await;

        assert!(cache.is_stale().await);
        assert_eq!(cache.current().await.listener_count(), 1);

        cache.clear().await;
        assert_eq!(cache.current().await.listener_count(), 0);
        assert!(cache.current().await.refreshed_at().is_none());
    }
}
