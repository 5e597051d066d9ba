//! Test harness for the event processor
//!
//! [`TestProcessor`] wires a processor to in-memory listeners, the three
//! standard sources, a recording waker and scripted tools.

#![allow(dead_code)]

use async_trait::async_trait;
use fa_core::sources::{HOME_ASSISTANT, INDEXING, WEBHOOK};
use fa_listeners::{ActionType, MemoryEventLog, MemoryListenerStore};
use fa_processor::{
    ActionDispatcher, ActionError, ActionResult, EventProcessor, ListenerTools, LlmWaker,
    PendingConfirmations, ProcessorConfig, ScriptAction, ToolAction, WakeLlmAction, WakeRequest,
};
use fa_script::{ScriptEngine, ScriptLimits, ToolError, ToolExecutor, ToolInfo};
use fa_sources::{
    EventSink, EventSource, EventStream, HomeAssistantApi, HomeAssistantSource,
    HomeAssistantSourceConfig, IndexingSource, SourceError, SourceResult, ValidationResult,
    WebhookSource,
};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Conversation whose wake-ups fail
pub const BROKEN_CONVERSATION: &str = "broken";

/// Records wake requests; fails for [`BROKEN_CONVERSATION`]
#[derive(Default)]
pub struct RecordingWaker {
    requests: Mutex<Vec<WakeRequest>>,
}

impl RecordingWaker {
    pub fn requests(&self) -> Vec<WakeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmWaker for RecordingWaker {
    async fn wake(&self, request: WakeRequest) -> ActionResult<()> {
        if request.conversation_id == BROKEN_CONVERSATION {
            return Err(ActionError::Wake("assistant unavailable".to_string()));
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// `notify` succeeds, `unlock_door` needs confirmation, `broken` fails
#[derive(Default)]
pub struct MockTools {
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTools {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockTools {
    async fn list_tools(&self) -> Vec<ToolInfo> {
        let tool = |name: &str, requires_confirmation| ToolInfo {
            name: name.to_string(),
            description: format!("{name} tool"),
            parameters: json!({"type": "object"}),
            requires_confirmation,
        };
        vec![
            tool("notify", false),
            tool("unlock_door", true),
            tool("broken", false),
        ]
    }

    async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        if name == "broken" {
            return Err(ToolError::Failed {
                name: name.to_string(),
                message: "backend error".to_string(),
            });
        }
        self.calls.lock().unwrap().push((name.to_string(), args));
        Ok(json!({"ok": true}))
    }
}

/// Home Assistant with a fixed entity catalog and a quiet subscription
pub struct CatalogApi {
    entities: Option<Vec<String>>,
}

impl CatalogApi {
    pub fn new(entities: Option<&[&str]>) -> Self {
        Self {
            entities: entities.map(|ids| ids.iter().map(|id| id.to_string()).collect()),
        }
    }
}

#[async_trait]
impl HomeAssistantApi for CatalogApi {
    async fn subscribe_state_changes(&self) -> SourceResult<EventStream> {
        Ok(futures::stream::pending().boxed())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn entity_ids(&self) -> SourceResult<Vec<String>> {
        self.entities
            .clone()
            .ok_or_else(|| SourceError::Connection("Home Assistant unavailable".to_string()))
    }
}

/// Source whose validation backend is always down
pub struct UnreachableValidationSource;

pub const UNREACHABLE: &str = "unreachable";

#[async_trait]
impl EventSource for UnreachableValidationSource {
    fn source_id(&self) -> &str {
        UNREACHABLE
    }

    async fn start(&self, _sink: Arc<dyn EventSink>) -> SourceResult<()> {
        Ok(())
    }

    async fn stop(&self) -> SourceResult<()> {
        Ok(())
    }

    fn supports_validation(&self) -> bool {
        true
    }

    async fn validate_match_conditions(
        &self,
        _conditions: &Map<String, Value>,
    ) -> SourceResult<ValidationResult> {
        Err(SourceError::Connection("validation backend unavailable".to_string()))
    }
}

pub const ENTITIES: &[&str] = &[
    "person.test",
    "person.alexander",
    "light.kitchen",
    "sensor.temperature",
];

pub struct TestProcessor {
    pub store: Arc<MemoryListenerStore>,
    pub waker: Arc<RecordingWaker>,
    pub tools: Arc<MockTools>,
    pub confirmations: Arc<PendingConfirmations>,
    pub event_log: Arc<MemoryEventLog>,
    pub webhook: Arc<WebhookSource>,
    pub indexing: Arc<IndexingSource>,
    pub home_assistant: Arc<HomeAssistantSource<CatalogApi>>,
    pub processor: Arc<EventProcessor>,
    pub listener_tools: ListenerTools,
}

impl TestProcessor {
    /// Started processor with the default catalog
    pub async fn start() -> Self {
        Self::start_with(Some(ENTITIES), ProcessorConfig::default()).await
    }

    /// Build without starting
    pub async fn build(catalog: Option<&[&str]>, config: ProcessorConfig) -> Self {
        let store = Arc::new(MemoryListenerStore::new());
        let waker = Arc::new(RecordingWaker::default());
        let tools = Arc::new(MockTools::default());
        let confirmations = Arc::new(PendingConfirmations::new(Duration::from_secs(30)));
        let event_log = Arc::new(MemoryEventLog::default());
        let engine = Arc::new(ScriptEngine::new(ScriptLimits::default()));

        let dispatcher = ActionDispatcher::new(Duration::from_secs(5))
            .with_handler(ActionType::WakeLlm, Arc::new(WakeLlmAction::new(waker.clone())))
            .with_handler(
                ActionType::Script,
                Arc::new(ScriptAction::new(
                    engine.clone(),
                    Some(tools.clone() as Arc<dyn ToolExecutor>),
                )),
            )
            .with_handler(
                ActionType::Tool,
                Arc::new(ToolAction::new(tools.clone(), Some(confirmations.clone()))),
            );

        let processor = Arc::new(
            EventProcessor::new(store.clone(), Arc::new(dispatcher), engine, config)
                .with_event_log(event_log.clone()),
        );

        let webhook = Arc::new(WebhookSource::new(WEBHOOK));
        let indexing = Arc::new(IndexingSource::new(INDEXING));
        let home_assistant = Arc::new(HomeAssistantSource::new(
            HOME_ASSISTANT,
            Arc::new(CatalogApi::new(catalog)),
            HomeAssistantSourceConfig::default(),
        ));
        processor.add_source(webhook.clone()).await.unwrap();
        processor.add_source(indexing.clone()).await.unwrap();
        processor.add_source(home_assistant.clone()).await.unwrap();
        processor
            .add_source(Arc::new(UnreachableValidationSource))
            .await
            .unwrap();

        let listener_tools = ListenerTools::new(store.clone(), processor.clone());
        Self {
            store,
            waker,
            tools,
            confirmations,
            event_log,
            webhook,
            indexing,
            home_assistant,
            processor,
            listener_tools,
        }
    }

    pub async fn start_with(catalog: Option<&[&str]>, config: ProcessorConfig) -> Self {
        let harness = Self::build(catalog, config).await;
        harness.processor.start().await.unwrap();
        harness
    }

    /// Create a listener through the tools, asserting success
    pub async fn create(&self, conversation_id: &str, args: Value) -> String {
        let response = self
            .listener_tools
            .call("create_event_listener", conversation_id, args)
            .await;
        assert_eq!(response["success"], true, "create failed: {response}");
        response["listener_id"].as_str().unwrap().to_string()
    }
}

/// A Home Assistant `state_changed` payload
pub fn state_change(entity_id: &str, old: &str, new: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "old_state": {"entity_id": entity_id, "state": old},
        "new_state": {"entity_id": entity_id, "state": new},
    })
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
