//! Shared plumbing for sources fed by in-process callers

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{SourceError, SourceResult};
use crate::health::SourceHealth;
use crate::source::EventSink;

const QUEUE_CAPACITY: usize = 256;

struct Running {
    tx: mpsc::Sender<Value>,
    task: JoinHandle<()>,
    health: Arc<SourceHealth>,
}

/// Queue drained by a single task so events reach the sink in push order
pub(crate) struct PassiveChannel {
    source_id: String,
    running: Mutex<Option<Running>>,
}

impl PassiveChannel {
    pub(crate) fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            running: Mutex::new(None),
        }
    }

    pub(crate) fn source_id(&self) -> &str {
        &self.source_id
    }

    pub(crate) async fn start(&self, sink: Arc<dyn EventSink>) -> SourceResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SourceError::AlreadyRunning {
                source_id: self.source_id.clone(),
            });
        }

        let health = Arc::new(SourceHealth::passive(self.source_id.clone()));
        sink.register_health(health.clone());

        let (tx, mut rx) = mpsc::channel::<Value>(QUEUE_CAPACITY);
        let source_id = self.source_id.clone();
        let task = tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                sink.process_event(&source_id, data).await;
            }
            debug!(source_id = %source_id, "Event queue closed");
        });

        *running = Some(Running { tx, task, health });
        info!(source_id = %self.source_id, "Started source");
        Ok(())
    }

    pub(crate) async fn send(&self, data: Value) -> SourceResult<()> {
        let tx = {
            let running = self.running.lock().await;
            let running = running.as_ref().ok_or_else(|| SourceError::NotRunning {
                source_id: self.source_id.clone(),
            })?;
            running.health.record_event();
            running.tx.clone()
        };

        tx.send(data).await.map_err(|_| SourceError::NotRunning {
            source_id: self.source_id.clone(),
        })
    }

    /// Stop accepting events; already queued events are still delivered
    pub(crate) async fn stop(&self) -> SourceResult<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };

        let Running { tx, task, health } = running;
        drop(tx);
        if let Err(e) = task.await {
            debug!(source_id = %self.source_id, error = %e, "Event queue task ended abnormally");
        }
        health.mark_disconnected();
        info!(source_id = %self.source_id, "Stopped source");
        Ok(())
    }
}
