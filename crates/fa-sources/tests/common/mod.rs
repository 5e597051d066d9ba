#![allow(dead_code)]

use async_trait::async_trait;
use fa_sources::{EventSink, EventStream, HomeAssistantApi, SourceError, SourceHealth, SourceResult};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sink that records every event and health registration
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(String, Value)>>,
    pub health: Mutex<Vec<Arc<SourceHealth>>>,
}

impl RecordingSink {
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, data)| data.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn process_event(&self, source_id: &str, data: Value) {
        self.events
            .lock()
            .unwrap()
            .push((source_id.to_string(), data));
    }

    fn register_health(&self, health: Arc<SourceHealth>) {
        self.health.lock().unwrap().push(health);
    }
}

/// Scriptable Home Assistant: each subscription is fed through a channel
pub struct MockApi {
    pub subscriptions: Mutex<Vec<mpsc::UnboundedSender<SourceResult<Value>>>>,
    pub subscribe_calls: AtomicUsize,
    pub refuse_connections: AtomicBool,
    pub alive: AtomicBool,
    pub entities: Option<Vec<String>>,
}

impl MockApi {
    pub fn new(entities: &[&str]) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            refuse_connections: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            entities: Some(entities.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Entity catalog requests fail
    pub fn without_catalog() -> Self {
        Self {
            entities: None,
            ..Self::new(&[])
        }
    }

    pub fn subscription(&self, index: usize) -> mpsc::UnboundedSender<SourceResult<Value>> {
        self.subscriptions.lock().unwrap()[index].clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

#[async_trait]
impl HomeAssistantApi for MockApi {
    async fn subscribe_state_changes(&self) -> SourceResult<EventStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections.load(Ordering::SeqCst) {
            return Err(SourceError::Connection("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push(tx);
        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn test_connection(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn entity_ids(&self) -> SourceResult<Vec<String>> {
        self.entities
            .clone()
            .ok_or_else(|| SourceError::Connection("Home Assistant unavailable".to_string()))
    }
}

/// Poll `condition` until it holds, failing after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
