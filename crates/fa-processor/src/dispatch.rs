//! Action dispatch
//!
//! Each [`ActionType`] maps to one [`ActionHandler`], registered when the
//! dispatcher is built. A dispatch is bounded by the dispatcher timeout.

use async_trait::async_trait;
use fa_core::Event;
use fa_listeners::{ActionType, EventListener};
use fa_script::{ScriptEngine, ToolError, ToolExecutor};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::confirm::{ConfirmationOutcome, ConfirmationRequest, PendingConfirmations};
use crate::error::{ActionError, ActionResult};

/// Runs one kind of action
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, listener: &EventListener, event: &Event) -> ActionResult<Value>;
}

/// Request to start an assistant turn in a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct WakeRequest {
    pub conversation_id: String,
    pub listener_id: String,
    pub listener_name: String,
    pub message: String,
    pub event: Value,
}

/// Wakes the assistant; implemented outside this crate
#[async_trait]
pub trait LlmWaker: Send + Sync {
    async fn wake(&self, request: WakeRequest) -> ActionResult<()>;
}

#[derive(Debug, Deserialize)]
struct WakeLlmConfig {
    #[serde(default)]
    context: Option<String>,
    #[serde(default = "default_true")]
    include_event_data: bool,
}

#[derive(Debug, Deserialize)]
struct ScriptActionConfig {
    script_code: String,
}

#[derive(Debug, Deserialize)]
struct ToolActionConfig {
    tool_name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
    #[serde(default)]
    confirmation_timeout_secs: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn parse_config<T: DeserializeOwned>(config: &Value) -> ActionResult<T> {
    let config = match config {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(config).map_err(|e| ActionError::InvalidConfig(e.to_string()))
}

/// Check that `config` has the shape `action_type` expects
pub fn check_action_config(action_type: ActionType, config: &Value) -> ActionResult<()> {
    match action_type {
        ActionType::WakeLlm => parse_config::<WakeLlmConfig>(config).map(drop),
        ActionType::Script => parse_config::<ScriptActionConfig>(config).map(drop),
        ActionType::Tool => parse_config::<ToolActionConfig>(config).map(drop),
    }
}

/// Action script source of a script listener, if it has one
pub fn action_script(config: &Value) -> Option<&str> {
    config.get("script_code").and_then(Value::as_str)
}

/// Wakes the assistant in the listener's conversation
pub struct WakeLlmAction {
    waker: Arc<dyn LlmWaker>,
}

impl WakeLlmAction {
    pub fn new(waker: Arc<dyn LlmWaker>) -> Self {
        Self { waker }
    }
}

#[async_trait]
impl ActionHandler for WakeLlmAction {
    async fn execute(&self, listener: &EventListener, event: &Event) -> ActionResult<Value> {
        let config: WakeLlmConfig = parse_config(&listener.action_config)?;

        let mut message = format!(
            "Event listener '{}' triggered on source '{}'.",
            listener.name, event.source_id
        );
        if let Some(context) = config.context.as_deref().filter(|c| !c.is_empty()) {
            message.push_str("\n\n");
            message.push_str(context);
        }
        if config.include_event_data {
            message.push_str("\n\nEvent data:\n");
            message.push_str(&serde_json::to_string_pretty(&event.data).unwrap_or_default());
        }

        self.waker
            .wake(WakeRequest {
                conversation_id: listener.conversation_id.clone(),
                listener_id: listener.id.clone(),
                listener_name: listener.name.clone(),
                message,
                event: event.data.clone(),
            })
            .await?;

        Ok(json!({"conversation_id": listener.conversation_id}))
    }
}

/// Runs `action_config.script_code` with tools available
pub struct ScriptAction {
    engine: Arc<ScriptEngine>,
    tools: Option<Arc<dyn ToolExecutor>>,
}

impl ScriptAction {
    pub fn new(engine: Arc<ScriptEngine>, tools: Option<Arc<dyn ToolExecutor>>) -> Self {
        Self { engine, tools }
    }
}

#[async_trait]
impl ActionHandler for ScriptAction {
    async fn execute(&self, listener: &EventListener, event: &Event) -> ActionResult<Value> {
        let config: ScriptActionConfig = parse_config(&listener.action_config)?;

        let bindings = json!({
            "event": event.script_view(),
            "listener": {
                "id": listener.id,
                "name": listener.name,
                "source_id": listener.source_id,
            },
            "conversation_id": listener.conversation_id,
        });

        let output = self
            .engine
            .run_action(&config.script_code, bindings, self.tools.clone())
            .await?;

        for line in &output.printed {
            info!(listener_id = %listener.id, "script: {}", line);
        }

        Ok(json!({"result": output.value, "printed": output.printed}))
    }
}

/// Calls `action_config.tool_name`, asking for confirmation when the tool
/// requires it
pub struct ToolAction {
    tools: Arc<dyn ToolExecutor>,
    confirmations: Option<Arc<PendingConfirmations>>,
}

impl ToolAction {
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        confirmations: Option<Arc<PendingConfirmations>>,
    ) -> Self {
        Self {
            tools,
            confirmations,
        }
    }
}

#[async_trait]
impl ActionHandler for ToolAction {
    async fn execute(&self, listener: &EventListener, _event: &Event) -> ActionResult<Value> {
        let config: ToolActionConfig = parse_config(&listener.action_config)?;
        let name = config.tool_name;
        let arguments = Value::Object(config.arguments);

        let tool = self
            .tools
            .get_tool(&name)
            .await
            .ok_or_else(|| ToolError::NotFound { name: name.clone() })?;

        if tool.requires_confirmation {
            let confirmations = self
                .confirmations
                .as_ref()
                .ok_or_else(|| ActionError::ConfirmationUnavailable { tool: name.clone() })?;
            let timeout = config
                .confirmation_timeout_secs
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map_or(confirmations.max_timeout(), Duration::from_secs_f64);

            let request =
                ConfirmationRequest::new(&listener.conversation_id, &name, arguments.clone());
            match confirmations.request(request, timeout).await {
                ConfirmationOutcome::Approved => debug!(tool = %name, "Tool call approved"),
                ConfirmationOutcome::Denied => return Err(ToolError::Denied { name }.into()),
                ConfirmationOutcome::TimedOut => {
                    return Err(ActionError::ConfirmationTimeout { tool: name })
                }
            }
        }

        Ok(self.tools.execute(&name, arguments).await?)
    }
}

/// Registry of action handlers
pub struct ActionDispatcher {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    pub fn with_handler(
        mut self,
        action_type: ActionType,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        self.handlers.insert(action_type, handler);
        self
    }

    pub fn supports(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    /// Run the listener's action for `event`
    pub async fn dispatch(&self, listener: &EventListener, event: &Event) -> ActionResult<Value> {
        let handler = self
            .handlers
            .get(&listener.action_type)
            .ok_or(ActionError::Unsupported {
                action_type: listener.action_type,
            })?;

        debug!(
            listener_id = %listener.id,
            action_type = %listener.action_type,
            "Dispatching action"
        );
        match tokio::time::timeout(self.timeout, handler.execute(listener, event)).await {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}
