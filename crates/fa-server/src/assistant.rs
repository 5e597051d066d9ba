//! Service assembly from configuration

use anyhow::{Context, Result};
use axum::Router;
use fa_config::{AssistantConfig, HomeAssistantSettings};
use fa_core::sources::{HOME_ASSISTANT, INDEXING, WEBHOOK};
use fa_listeners::{ActionType, EventLog, JsonListenerStore, ListenerStore, MemoryEventLog, Storage};
use fa_processor::{
    ActionDispatcher, EventProcessor, ListenerTools, PendingConfirmations, ProcessorConfig,
    ScriptAction, ToolAction, WakeLlmAction,
};
use fa_script::{ScriptEngine, ScriptLimits, ToolExecutor};
use fa_sources::{
    Backoff, HomeAssistantClient, HomeAssistantSource, HomeAssistantSourceConfig, IndexingSource,
    WebhookSource,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::standins::{LoggingWaker, NoTools};

/// The wired event pipeline
pub struct Assistant {
    bind: String,
    processor: Arc<EventProcessor>,
    indexing: Arc<IndexingSource>,
    state: AppState,
}

fn home_assistant_source_config(settings: &HomeAssistantSettings) -> HomeAssistantSourceConfig {
    HomeAssistantSourceConfig {
        backoff: Backoff::new(
            settings.base_reconnect_delay(),
            settings.max_reconnect_delay(),
        ),
        health_check_interval: settings.health_check_interval(),
        stale_after: settings.stale_after(),
    }
}

impl Assistant {
    /// Build every component; nothing is started yet
    pub async fn build(config: &AssistantConfig, config_dir: &Path) -> Result<Self> {
        let storage_dir = config.storage.resolve(config_dir);
        let store: Arc<dyn ListenerStore> = Arc::new(
            JsonListenerStore::open(Storage::new(&storage_dir))
                .await
                .with_context(|| format!("opening listener store in {:?}", storage_dir))?,
        );

        let engine = Arc::new(ScriptEngine::new(ScriptLimits {
            max_script_bytes: config.script.max_script_bytes,
            timeout: config.script.timeout(),
            fuel: config.script.fuel,
        }));
        let tools: Arc<dyn ToolExecutor> = Arc::new(NoTools);
        let confirmations = Arc::new(PendingConfirmations::new(config.confirmation.max_timeout()));

        let dispatcher = ActionDispatcher::new(config.event_processor.dispatch_timeout())
            .with_handler(ActionType::WakeLlm, Arc::new(WakeLlmAction::new(Arc::new(LoggingWaker))))
            .with_handler(
                ActionType::Script,
                Arc::new(ScriptAction::new(engine.clone(), Some(tools.clone()))),
            )
            .with_handler(
                ActionType::Tool,
                Arc::new(ToolAction::new(tools, Some(confirmations.clone()))),
            );

        let event_log = Arc::new(MemoryEventLog::default());
        let processor = Arc::new(
            EventProcessor::new(
                store.clone(),
                Arc::new(dispatcher),
                engine,
                ProcessorConfig {
                    cache_ttl: config.event_processor.cache_ttl(),
                    dedup_window: config.event_processor.dedup_window(),
                },
            )
            .with_event_log(event_log.clone()),
        );

        let webhook = Arc::new(WebhookSource::new(WEBHOOK));
        processor.add_source(webhook.clone()).await?;
        let indexing = Arc::new(IndexingSource::new(INDEXING));
        processor.add_source(indexing.clone()).await?;

        match &config.home_assistant {
            Some(settings) => {
                let client = HomeAssistantClient::new(&settings.url, &settings.token)
                    .context("configuring Home Assistant client")?;
                let source = HomeAssistantSource::new(
                    HOME_ASSISTANT,
                    Arc::new(client),
                    home_assistant_source_config(settings),
                );
                processor.add_source(Arc::new(source)).await?;
                info!(url = %settings.url, "Home Assistant source configured");
            }
            None => info!("No home_assistant section, Home Assistant source disabled"),
        }

        let state = AppState {
            processor: processor.clone(),
            webhooks: Arc::new(HashMap::from([(WEBHOOK.to_string(), webhook)])),
            tools: Arc::new(ListenerTools::new(store, processor.clone())),
            confirmations,
            event_log: event_log as Arc<dyn EventLog>,
        };

        Ok(Self {
            bind: config.server.bind.clone(),
            processor,
            indexing,
            state,
        })
    }

    pub fn bind_addr(&self) -> &str {
        &self.bind
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub fn processor(&self) -> &Arc<EventProcessor> {
        &self.processor
    }

    /// Handle for the document indexing pipeline
    pub fn indexing(&self) -> &Arc<IndexingSource> {
        &self.indexing
    }

    pub async fn start(&self) -> Result<()> {
        self.processor.start().await?;
        info!(sources = ?self.processor.source_ids().await, "Event pipeline started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.processor.stop().await;
    }
}
