//! Home Assistant state-change source
//!
//! Two background tasks share one [`SourceHealth`]:
//!
//! - the reconnect loop runs the websocket listener as a child task and
//!   restarts it with exponential backoff whenever it ends
//! - the health-check loop pings the REST API when no event arrived for
//!   `stale_after`; a failed ping marks the source unhealthy and aborts the
//!   listener so the reconnect loop starts over
//!
//! Staleness is advisory. A quiet connection keeps delivering events until a
//! ping actually fails.

mod client;
mod validate;

pub use client::HomeAssistantClient;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::{SourceError, SourceResult};
use crate::health::{Backoff, ConnectionState, SourceHealth};
use crate::source::{EventSink, EventSource};
use crate::validation::ValidationResult;

/// State-change payloads (`event.data`) from one subscription
pub type EventStream = BoxStream<'static, SourceResult<Value>>;

/// Operations the source needs from a Home Assistant instance
#[async_trait]
pub trait HomeAssistantApi: Send + Sync + 'static {
    /// Connect, authenticate and subscribe to `state_changed`
    ///
    /// The stream ends when the connection closes.
    async fn subscribe_state_changes(&self) -> SourceResult<EventStream>;

    /// Active liveness ping
    async fn test_connection(&self) -> bool;

    /// Every entity id currently known to Home Assistant
    async fn entity_ids(&self) -> SourceResult<Vec<String>>;
}

/// Timing of the reconnect and health-check loops
#[derive(Debug, Clone)]
pub struct HomeAssistantSourceConfig {
    pub backoff: Backoff,
    pub health_check_interval: Duration,
    pub stale_after: Duration,
}

impl Default for HomeAssistantSourceConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            health_check_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
        }
    }
}

/// Outcome of one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    /// Not connected; recovery belongs to the reconnect loop
    NotConnected,
    /// An event arrived recently
    Fresh,
    /// No recent events but the ping succeeded
    IdleButAlive,
    /// Ping failed; the listener was cancelled
    Dead,
}

struct Shared<A> {
    source_id: String,
    api: Arc<A>,
    config: HomeAssistantSourceConfig,
    health: Arc<SourceHealth>,
    /// Abort handle of the current websocket listener task
    connection: Mutex<Option<AbortHandle>>,
}

/// Source streaming Home Assistant `state_changed` events
pub struct HomeAssistantSource<A: HomeAssistantApi> {
    shared: Arc<Shared<A>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: HomeAssistantApi> HomeAssistantSource<A> {
    pub fn new(
        source_id: impl Into<String>,
        api: Arc<A>,
        config: HomeAssistantSourceConfig,
    ) -> Self {
        let source_id = source_id.into();
        let health = Arc::new(SourceHealth::new(source_id.clone(), config.backoff.base));
        Self {
            shared: Arc::new(Shared {
                source_id,
                api,
                config,
                health,
                connection: Mutex::new(None),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn health(&self) -> Arc<SourceHealth> {
        self.shared.health.clone()
    }

    /// Run one health check now
    pub async fn check_health(&self) -> HealthCheck {
        check_health(&self.shared).await
    }
}

#[async_trait]
impl<A: HomeAssistantApi> EventSource for HomeAssistantSource<A> {
    fn source_id(&self) -> &str {
        &self.shared.source_id
    }

    async fn start(&self, sink: Arc<dyn EventSink>) -> SourceResult<()> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Err(SourceError::AlreadyRunning {
                source_id: self.shared.source_id.clone(),
            });
        }

        sink.register_health(self.shared.health.clone());
        tasks.push(tokio::spawn(reconnect_loop(self.shared.clone(), sink)));
        tasks.push(tokio::spawn(health_check_loop(self.shared.clone())));
        info!(source_id = %self.shared.source_id, "Started Home Assistant source");
        Ok(())
    }

    async fn stop(&self) -> SourceResult<()> {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        if let Some(connection) = self.shared.connection.lock().await.take() {
            connection.abort();
        }
        self.shared.health.mark_disconnected();
        info!(source_id = %self.shared.source_id, "Stopped Home Assistant source");
        Ok(())
    }

    fn supports_validation(&self) -> bool {
        true
    }

    async fn validate_match_conditions(
        &self,
        conditions: &Map<String, Value>,
    ) -> SourceResult<ValidationResult> {
        Ok(validate::validate_conditions(self.shared.api.as_ref(), conditions).await)
    }
}

async fn reconnect_loop<A: HomeAssistantApi>(shared: Arc<Shared<A>>, sink: Arc<dyn EventSink>) {
    let source_id = shared.source_id.clone();
    loop {
        if let Err(e) = shared.health.transition(ConnectionState::Connecting) {
            debug!(source_id = %source_id, error = %e, "Unexpected connection state");
        }

        // Spawn and record under the lock so stop() never misses a listener
        let listener = {
            let mut connection = shared.connection.lock().await;
            let task = tokio::spawn(listen(shared.clone(), sink.clone()));
            *connection = Some(task.abort_handle());
            task
        };

        let outcome = listener.await;
        shared.connection.lock().await.take();
        shared.health.mark_disconnected();

        match outcome {
            Ok(Ok(())) => info!(source_id = %source_id, "Home Assistant connection closed"),
            Ok(Err(e)) => {
                warn!(source_id = %source_id, error = %e, "Home Assistant connection failed")
            }
            Err(e) if e.is_cancelled() => {
                warn!(source_id = %source_id, "Home Assistant listener cancelled")
            }
            Err(e) => {
                error!(source_id = %source_id, error = %e, "Home Assistant listener panicked")
            }
        }

        let delay = shared.health.record_failure(&shared.config.backoff);
        info!(
            source_id = %source_id,
            attempt = shared.health.reconnect_attempts(),
            "Reconnecting in {:.1}s",
            delay.as_secs_f64()
        );
        tokio::time::sleep(delay).await;
    }
}

async fn listen<A: HomeAssistantApi>(
    shared: Arc<Shared<A>>,
    sink: Arc<dyn EventSink>,
) -> SourceResult<()> {
    let mut events = shared.api.subscribe_state_changes().await?;
    if let Err(e) = shared.health.mark_connected(&shared.config.backoff) {
        warn!(source_id = %shared.source_id, error = %e, "Connected from unexpected state");
    }
    info!(source_id = %shared.source_id, "Connected to Home Assistant");

    while let Some(item) = events.next().await {
        let data = item?;
        shared.health.record_event();
        sink.process_event(&shared.source_id, data).await;
    }
    Ok(())
}

async fn health_check_loop<A: HomeAssistantApi>(shared: Arc<Shared<A>>) {
    loop {
        tokio::time::sleep(shared.config.health_check_interval).await;
        check_health(&shared).await;
    }
}

async fn check_health<A: HomeAssistantApi>(shared: &Shared<A>) -> HealthCheck {
    let health = &shared.health;
    if !health.is_healthy() {
        return HealthCheck::NotConnected;
    }
    if !health.is_stale(shared.config.stale_after, Utc::now()) {
        return HealthCheck::Fresh;
    }

    if shared.api.test_connection().await {
        debug!(source_id = %shared.source_id, "No recent events, connection is idle but alive");
        return HealthCheck::IdleButAlive;
    }

    warn!(
        source_id = %shared.source_id,
        "No events for {}s and the ping failed, forcing reconnect",
        shared.config.stale_after.as_secs()
    );
    health.set_healthy(false);
    if let Some(connection) = shared.connection.lock().await.as_ref() {
        connection.abort();
    }
    HealthCheck::Dead
}
