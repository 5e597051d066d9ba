//! Event processor
//!
//! Sources push raw payloads through [`EventSink::process_event`]. For each
//! event the processor reads the enabled listeners of that source from its
//! cache, evaluates their conditions, and dispatches the matching listeners'
//! actions. Every dispatch runs in its own task so a failing or panicking
//! action never affects the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fa_core::Event;
use fa_listeners::{EventListener, EventLog, ListenerStore};
use fa_script::{ScriptEngine, ScriptResult};
use fa_sources::{ConnectionState, EventSink, EventSource, HealthSnapshot, SourceHealth};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::cache::ListenerCache;
use crate::condition::ConditionEvaluator;
use crate::dedup::DedupWindow;
use crate::dispatch::ActionDispatcher;
use crate::error::{ProcessorError, ProcessorResult};

/// Processor tuning
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How long a loaded listener cache is trusted
    pub cache_ttl: Duration,
    /// Identical payloads for one listener inside this window dispatch once
    pub dedup_window: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            dedup_window: Duration::ZERO,
        }
    }
}

/// What happened to one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    /// Listeners whose condition was evaluated
    pub evaluated: usize,
    /// Listeners whose condition matched and passed duplicate suppression
    pub matched: usize,
    pub dispatched: usize,
    pub failed: usize,
    /// Ids of listeners whose action succeeded
    pub triggered: Vec<String>,
}

/// Diagnostics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub processor_running: bool,
    pub sources: BTreeMap<String, HealthSnapshot>,
    pub listener_cache: CacheStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub listener_count: usize,
    pub source_count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Matches events against listeners and dispatches their actions
pub struct EventProcessor {
    store: Arc<dyn ListenerStore>,
    dispatcher: Arc<ActionDispatcher>,
    evaluator: ConditionEvaluator,
    cache: ListenerCache,
    dedup: DedupWindow,
    sources: RwLock<HashMap<String, Arc<dyn EventSource>>>,
    health: DashMap<String, Arc<SourceHealth>>,
    event_log: Option<Arc<dyn EventLog>>,
    running: AtomicBool,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn ListenerStore>,
        dispatcher: Arc<ActionDispatcher>,
        engine: Arc<ScriptEngine>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            evaluator: ConditionEvaluator::new(engine),
            cache: ListenerCache::new(config.cache_ttl),
            dedup: DedupWindow::new(config.dedup_window),
            sources: RwLock::new(HashMap::new()),
            health: DashMap::new(),
            event_log: None,
            running: AtomicBool::new(false),
        }
    }

    /// Record events from sources that persist them
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Register a source; only allowed before [`EventProcessor::start`]
    pub async fn add_source(&self, source: Arc<dyn EventSource>) -> ProcessorResult<()> {
        if self.is_running() {
            return Err(ProcessorError::Running);
        }

        let mut sources = self.sources.write().await;
        let source_id = source.source_id().to_string();
        if sources.contains_key(&source_id) {
            return Err(ProcessorError::DuplicateSource { source_id });
        }
        debug!(source_id = %source_id, "Registered event source");
        sources.insert(source_id, source);
        Ok(())
    }

    pub async fn source(&self, source_id: &str) -> Option<Arc<dyn EventSource>> {
        self.sources.read().await.get(source_id).cloned()
    }

    /// Registered source ids, sorted
    pub async fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Load listeners and start every registered source
    ///
    /// A source that fails to start is logged and skipped.
    pub async fn start(self: &Arc<Self>) -> ProcessorResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Event processor already running");
            return Ok(());
        }

        info!("Starting event processor");
        if let Err(e) = self.refresh_cache(true).await {
            error!(error = %e, "Failed to load event listeners");
        }

        let sink: Arc<dyn EventSink> = self.clone();
        let sources: Vec<Arc<dyn EventSource>> =
            self.sources.read().await.values().cloned().collect();
        for source in sources {
            match source.start(sink.clone()).await {
                Ok(()) => info!(source_id = %source.source_id(), "Started event source"),
                Err(e) => {
                    error!(
                        source_id = %source.source_id(),
                        error = %e,
                        "Failed to start event source"
                    )
                }
            }
        }
        Ok(())
    }

    /// Stop every source and drop the listener cache
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!("Stopping event processor");
        let sources: Vec<Arc<dyn EventSource>> =
            self.sources.read().await.values().cloned().collect();
        for source in sources {
            if let Err(e) = source.stop().await {
                warn!(source_id = %source.source_id(), error = %e, "Failed to stop event source");
            }
        }
        self.cache.clear().await;
        info!("Event processor stopped");
    }

    /// Reload listeners from the store when stale, or always with `force`
    pub async fn refresh_cache(&self, force: bool) -> ProcessorResult<()> {
        if !force && !self.cache.is_stale().await {
            return Ok(());
        }

        let listeners = self.store.list_enabled().await?;
        let snapshot = self.cache.replace(listeners).await;
        debug!(
            listeners = snapshot.listener_count(),
            sources = snapshot.source_count(),
            "Refreshed listener cache"
        );
        Ok(())
    }

    /// Reload listeners on the next event
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    /// Static checks on a condition script
    pub fn validate_script(&self, code: &str) -> ScriptResult<()> {
        self.evaluator.validate_script(code)
    }

    async fn listeners_for(&self, source_id: &str) -> Vec<Arc<EventListener>> {
        if let Err(e) = self.refresh_cache(false).await {
            warn!(error = %e, "Listener cache refresh failed, using previous listeners");
        }
        self.cache.current().await.listeners_for(source_id)
    }

    /// Process one event and report what happened
    pub async fn handle_event(&self, source_id: &str, data: Value) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        if !self.is_running() {
            debug!(source_id = %source_id, "Processor not running, dropping event");
            return summary;
        }

        let event = Arc::new(Event::new(source_id, data));
        let listeners = self.listeners_for(source_id).await;
        summary.evaluated = listeners.len();
        trace!(source_id = %source_id, listeners = listeners.len(), "Processing event");

        let verdicts = join_all(
            listeners
                .iter()
                .map(|listener| self.evaluator.matches(listener, &event)),
        )
        .await;

        let matched: Vec<Arc<EventListener>> = listeners
            .into_iter()
            .zip(verdicts)
            .filter(|(_, matched)| *matched)
            .map(|(listener, _)| listener)
            .filter(|listener| {
                let admitted = self.dedup.admit(&listener.id, &event.data);
                if !admitted {
                    debug!(listener_id = %listener.id, "Suppressed duplicate event");
                }
                admitted
            })
            .collect();
        summary.matched = matched.len();

        let tasks = matched.iter().map(|listener| {
            let dispatcher = self.dispatcher.clone();
            let listener = listener.clone();
            let event = event.clone();
            tokio::spawn(async move { dispatcher.dispatch(&listener, &event).await })
        });
        let results = join_all(tasks).await;

        for (listener, result) in matched.iter().zip(results) {
            match result {
                Ok(Ok(_)) => {
                    info!(
                        listener_id = %listener.id,
                        action_type = %listener.action_type,
                        "Event listener '{}' triggered",
                        listener.name
                    );
                    summary.dispatched += 1;
                    summary.triggered.push(listener.id.clone());
                    self.after_trigger(listener, event.time_fired).await;
                }
                Ok(Err(e)) => {
                    summary.failed += 1;
                    warn!(
                        listener_id = %listener.id,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Event listener action failed"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        listener_id = %listener.id,
                        error = %e,
                        "Event listener action panicked"
                    );
                }
            }
        }

        self.log_event(&event, &summary.triggered).await;
        summary
    }

    async fn after_trigger(&self, listener: &EventListener, at: DateTime<Utc>) {
        if let Err(e) = self.store.record_trigger(&listener.id, at).await {
            warn!(listener_id = %listener.id, error = %e, "Failed to record trigger");
        }

        if listener.one_time {
            match self.store.set_enabled(&listener.id, false).await {
                Ok(_) => info!(listener_id = %listener.id, "Disabled one-time event listener"),
                Err(e) => {
                    warn!(
                        listener_id = %listener.id,
                        error = %e,
                        "Failed to disable one-time listener"
                    )
                }
            }
            self.invalidate_cache().await;
        }
    }

    async fn log_event(&self, event: &Event, triggered: &[String]) {
        let Some(event_log) = &self.event_log else {
            return;
        };
        let persist = self
            .source(&event.source_id)
            .await
            .is_some_and(|source| source.persist_events());
        if !persist {
            return;
        }
        if let Err(e) = event_log.append(event, triggered.to_vec()).await {
            warn!(source_id = %event.source_id, error = %e, "Failed to store event");
        }
    }

    /// Diagnostics for the health endpoint; never fails
    pub async fn get_health_status(&self) -> HealthStatus {
        let mut sources: BTreeMap<String, HealthSnapshot> = self
            .health
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();

        for source_id in self.source_ids().await {
            sources.entry(source_id).or_insert_with(|| HealthSnapshot {
                healthy: false,
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
                reconnect_delay_secs: 0.0,
                last_event_time: None,
            });
        }

        let snapshot = self.cache.current().await;
        HealthStatus {
            processor_running: self.is_running(),
            sources,
            listener_cache: CacheStatus {
                listener_count: snapshot.listener_count(),
                source_count: snapshot.source_count(),
                last_refresh: snapshot.refreshed_at(),
            },
        }
    }
}

#[async_trait]
impl EventSink for EventProcessor {
    async fn process_event(&self, source_id: &str, data: Value) {
        let summary = self.handle_event(source_id, data).await;
        trace!(source_id = %source_id, ?summary, "Processed event");
    }

    fn register_health(&self, health: Arc<SourceHealth>) {
        self.health.insert(health.source_id().to_string(), health);
    }
}
