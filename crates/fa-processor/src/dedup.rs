//! Suppression of repeated identical payloads per listener

use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

pub(crate) struct DedupWindow {
    window: Duration,
    /// (listener id, serialized payload) -> last admission
    seen: DashMap<(String, String), Instant>,
}

impl DedupWindow {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    /// Whether `data` should be dispatched to `listener_id` now
    ///
    /// Always true when the window is zero.
    pub(crate) fn admit(&self, listener_id: &str, data: &Value) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let now = Instant::now();
        self.seen
            .retain(|_, at| now.duration_since(*at) < self.window);

        let key = (listener_id.to_string(), data.to_string());
        match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}
