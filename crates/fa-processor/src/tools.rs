//! Listener management tools exposed to the assistant
//!
//! Every operation answers with a JSON object carrying `success` and
//! `message`. Validation failures add `validation_errors`; non-blocking
//! problems are returned as `warnings`.

use fa_listeners::{
    ActionType, EventListener, ListenerFilter, ListenerStore, ListenerUpdate, NewListener,
    StoreError,
};
use fa_script::{ScriptError, ScriptErrorKind, ToolInfo};
use fa_sources::validation::check_structure;
use fa_sources::{EventSource, ValidationError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatch::{action_script, check_action_config};
use crate::error::ActionError;
use crate::processor::EventProcessor;

pub const CREATE_EVENT_LISTENER: &str = "create_event_listener";
pub const LIST_EVENT_LISTENERS: &str = "list_event_listeners";
pub const UPDATE_EVENT_LISTENER: &str = "update_event_listener";
pub const DELETE_EVENT_LISTENER: &str = "delete_event_listener";
pub const TOGGLE_EVENT_LISTENER: &str = "toggle_event_listener";

/// Why a listener tool call was rejected
#[derive(Debug, Error)]
pub enum ListenerToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown source '{source_id}'. Available sources: {}", .available.join(", "))]
    UnknownSource {
        source_id: String,
        available: Vec<String>,
    },

    #[error("Validation failed")]
    Validation {
        errors: Vec<ValidationError>,
        warnings: Vec<String>,
    },

    #[error("Invalid condition script: {0}")]
    ConditionScript(ScriptError),

    #[error("Invalid action script: {0}")]
    ActionScript(ScriptError),

    #[error("Invalid action: {0}")]
    Action(#[from] ActionError),

    #[error("Event listener '{id}' not found")]
    NotFound { id: String },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{0}")]
    Store(#[from] StoreError),
}

fn error_kind_name(kind: ScriptErrorKind) -> &'static str {
    match kind {
        ScriptErrorKind::Syntax => "syntax",
        ScriptErrorKind::Execution => "execution",
        ScriptErrorKind::Timeout => "timeout",
    }
}

impl ListenerToolError {
    /// JSON answer for the assistant
    pub fn to_response(&self) -> Value {
        let mut response = json!({"success": false, "message": self.to_string()});
        match self {
            ListenerToolError::Validation { errors, warnings } => {
                response["validation_errors"] = json!(errors);
                if !warnings.is_empty() {
                    response["warnings"] = json!(warnings);
                }
            }
            ListenerToolError::ConditionScript(e) | ListenerToolError::ActionScript(e) => {
                response["error_type"] = json!(error_kind_name(e.kind()));
            }
            ListenerToolError::UnknownSource { available, .. } => {
                response["available_sources"] = json!(available);
            }
            _ => {}
        }
        response
    }
}

type ToolResult = Result<Value, ListenerToolError>;

fn respond(result: ToolResult) -> Value {
    result.unwrap_or_else(|e| e.to_response())
}

fn with_warnings(mut response: Value, warnings: Vec<String>) -> Value {
    if !warnings.is_empty() {
        response["warnings"] = json!(warnings);
    }
    response
}

/// Arguments of `create_event_listener`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateListenerArgs {
    pub name: String,
    pub source_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub match_conditions: Map<String, Value>,
    #[serde(default)]
    pub condition_script: Option<String>,
    #[serde(default = "default_action_type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_config: Value,
    #[serde(default)]
    pub one_time: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_action_type() -> ActionType {
    ActionType::WakeLlm
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    source_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    listener_id: String,
}

#[derive(Debug, Deserialize)]
struct ToggleArgs {
    listener_id: String,
    enabled: bool,
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ListenerToolError> {
    serde_json::from_value(args).map_err(|e| ListenerToolError::InvalidArguments(e.to_string()))
}

/// Create, list, update, delete and toggle event listeners
pub struct ListenerTools {
    store: Arc<dyn ListenerStore>,
    processor: Arc<EventProcessor>,
}

impl ListenerTools {
    pub fn new(store: Arc<dyn ListenerStore>, processor: Arc<EventProcessor>) -> Self {
        Self { store, processor }
    }

    /// Tool descriptions offered to the assistant
    pub fn definitions() -> Vec<ToolInfo> {
        let id_param = json!({"type": "string", "description": "Id of the event listener"});
        vec![
            ToolInfo {
                name: CREATE_EVENT_LISTENER.to_string(),
                description: "Create a listener that reacts to events from a source".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "source_id": {
                            "type": "string",
                            "enum": ["home_assistant", "indexing", "webhook"]
                        },
                        "description": {"type": "string"},
                        "match_conditions": {
                            "type": "object",
                            "description": concat!(
                                "Dotted paths that must equal the given values, e.g. ",
                                "{\"entity_id\": \"person.alex\", \"new_state.state\": \"home\"}"
                            )
                        },
                        "condition_script": {
                            "type": "string",
                            "description": concat!(
                                "Boolean expression over `event`; ",
                                "replaces match_conditions when set"
                            )
                        },
                        "action_type": {"type": "string", "enum": ["wake_llm", "script", "tool"]},
                        "action_config": {"type": "object"},
                        "one_time": {"type": "boolean"}
                    },
                    "required": ["name", "source_id"]
                }),
                requires_confirmation: false,
            },
            ToolInfo {
                name: LIST_EVENT_LISTENERS.to_string(),
                description: "List the event listeners of this conversation".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"source_id": {"type": "string"}}
                }),
                requires_confirmation: false,
            },
            ToolInfo {
                name: UPDATE_EVENT_LISTENER.to_string(),
                description: "Change fields of an event listener".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "listener_id": id_param,
                        "name": {"type": "string"},
                        "description": {"type": "string"},
                        "match_conditions": {"type": "object"},
                        "condition_script": {"type": ["string", "null"]},
                        "action_type": {"type": "string", "enum": ["wake_llm", "script", "tool"]},
                        "action_config": {"type": "object"},
                        "one_time": {"type": "boolean"}
                    },
                    "required": ["listener_id"]
                }),
                requires_confirmation: false,
            },
            ToolInfo {
                name: DELETE_EVENT_LISTENER.to_string(),
                description: "Delete an event listener".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"listener_id": id_param},
                    "required": ["listener_id"]
                }),
                requires_confirmation: false,
            },
            ToolInfo {
                name: TOGGLE_EVENT_LISTENER.to_string(),
                description: "Enable or disable an event listener".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"listener_id": id_param, "enabled": {"type": "boolean"}},
                    "required": ["listener_id", "enabled"]
                }),
                requires_confirmation: false,
            },
        ]
    }

    /// Run a tool by name with JSON arguments
    pub async fn call(&self, tool_name: &str, conversation_id: &str, args: Value) -> Value {
        respond(self.call_tool(tool_name, conversation_id, args).await)
    }

    async fn call_tool(&self, tool_name: &str, conversation_id: &str, args: Value) -> ToolResult {
        match tool_name {
            CREATE_EVENT_LISTENER => self.create(conversation_id, parse(args)?).await,
            LIST_EVENT_LISTENERS => {
                let args: ListArgs = parse(args)?;
                self.list(conversation_id, args.source_id.as_deref()).await
            }
            UPDATE_EVENT_LISTENER => self.update_from_args(conversation_id, args).await,
            DELETE_EVENT_LISTENER => {
                let args: IdArgs = parse(args)?;
                self.delete(conversation_id, &args.listener_id).await
            }
            TOGGLE_EVENT_LISTENER => {
                let args: ToggleArgs = parse(args)?;
                self.toggle(conversation_id, &args.listener_id, args.enabled).await
            }
            other => Err(ListenerToolError::UnknownTool(other.to_string())),
        }
    }

    pub async fn create_event_listener(
        &self,
        conversation_id: &str,
        args: CreateListenerArgs,
    ) -> Value {
        respond(self.create(conversation_id, args).await)
    }

    pub async fn list_event_listeners(
        &self,
        conversation_id: &str,
        source_id: Option<&str>,
    ) -> Value {
        respond(self.list(conversation_id, source_id).await)
    }

    pub async fn update_event_listener(
        &self,
        conversation_id: &str,
        listener_id: &str,
        update: ListenerUpdate,
    ) -> Value {
        respond(self.update(conversation_id, listener_id, update).await)
    }

    pub async fn delete_event_listener(&self, conversation_id: &str, listener_id: &str) -> Value {
        respond(self.delete(conversation_id, listener_id).await)
    }

    pub async fn toggle_event_listener(
        &self,
        conversation_id: &str,
        listener_id: &str,
        enabled: bool,
    ) -> Value {
        respond(self.toggle(conversation_id, listener_id, enabled).await)
    }

    async fn source(&self, source_id: &str) -> Result<Arc<dyn EventSource>, ListenerToolError> {
        match self.processor.source(source_id).await {
            Some(source) => Ok(source),
            None => Err(ListenerToolError::UnknownSource {
                source_id: source_id.to_string(),
                available: self.processor.source_ids().await,
            }),
        }
    }

    /// Structural checks together with the source's own validation
    ///
    /// Both always run so every bad field is reported at once. Returns the
    /// warnings to pass back on success.
    async fn validate_conditions(
        &self,
        source: &dyn EventSource,
        conditions: &Map<String, Value>,
    ) -> Result<Vec<String>, ListenerToolError> {
        let mut result = check_structure(conditions);

        if source.supports_validation() && !conditions.is_empty() {
            match source.validate_match_conditions(conditions).await {
                Ok(checked) => result.merge(checked),
                Err(e) => {
                    warn!(
                        source_id = %source.source_id(),
                        error = %e,
                        "Match condition validation unavailable"
                    );
                    result.add_warning(format!("Could not validate match conditions: {e}"));
                }
            }
        }

        for warning in &result.warnings {
            warn!(source_id = %source.source_id(), "Listener validation warning: {}", warning);
        }
        if !result.valid {
            return Err(ListenerToolError::Validation {
                errors: result.errors,
                warnings: result.warnings,
            });
        }
        Ok(result.warnings)
    }

    fn check_scripts(
        &self,
        condition_script: Option<&str>,
        action_type: ActionType,
        action_config: &Value,
    ) -> Result<(), ListenerToolError> {
        if let Some(code) = condition_script.filter(|code| !code.trim().is_empty()) {
            self.processor
                .validate_script(code)
                .map_err(ListenerToolError::ConditionScript)?;
        }

        check_action_config(action_type, action_config)?;
        if action_type == ActionType::Script {
            if let Some(code) = action_script(action_config) {
                self.processor
                    .validate_script(code)
                    .map_err(ListenerToolError::ActionScript)?;
            }
        }
        Ok(())
    }

    /// The listener, if it exists and belongs to the conversation
    async fn owned(
        &self,
        conversation_id: &str,
        listener_id: &str,
    ) -> Result<EventListener, ListenerToolError> {
        self.store
            .get(listener_id)
            .await?
            .filter(|listener| listener.conversation_id == conversation_id)
            .ok_or_else(|| ListenerToolError::NotFound {
                id: listener_id.to_string(),
            })
    }

    async fn create(&self, conversation_id: &str, args: CreateListenerArgs) -> ToolResult {
        if args.name.trim().is_empty() {
            return Err(ListenerToolError::InvalidArguments("name cannot be empty".to_string()));
        }

        let source = self.source(&args.source_id).await?;
        let warnings = self
            .validate_conditions(source.as_ref(), &args.match_conditions)
            .await?;
        self.check_scripts(
            args.condition_script.as_deref(),
            args.action_type,
            &args.action_config,
        )?;

        let listener = self
            .store
            .create(NewListener {
                name: args.name,
                description: args.description,
                source_id: args.source_id,
                match_conditions: args.match_conditions,
                condition_script: args.condition_script,
                action_type: args.action_type,
                action_config: args.action_config,
                conversation_id: conversation_id.to_string(),
                one_time: args.one_time,
                enabled: args.enabled,
            })
            .await?;
        self.processor.invalidate_cache().await;

        info!(
            listener_id = %listener.id,
            source_id = %listener.source_id,
            "Registered event listener '{}'",
            listener.name
        );
        Ok(with_warnings(
            json!({
                "success": true,
                "listener_id": listener.id,
                "message": format!("Created event listener '{}'", listener.name),
            }),
            warnings,
        ))
    }

    async fn list(&self, conversation_id: &str, source_id: Option<&str>) -> ToolResult {
        let filter = ListenerFilter {
            source_id: source_id.map(str::to_string),
            ..ListenerFilter::conversation(conversation_id)
        };
        let listeners = self.store.list(&filter).await?;
        Ok(json!({
            "success": true,
            "count": listeners.len(),
            "listeners": listeners,
        }))
    }

    async fn update_from_args(&self, conversation_id: &str, args: Value) -> ToolResult {
        let Value::Object(mut fields) = args else {
            return Err(ListenerToolError::InvalidArguments(
                "arguments must be an object".to_string(),
            ));
        };
        let listener_id = match fields.remove("listener_id") {
            Some(Value::String(id)) => id,
            _ => {
                return Err(ListenerToolError::InvalidArguments(
                    "listener_id must be a string".to_string(),
                ))
            }
        };
        let update: ListenerUpdate = parse(Value::Object(fields))?;
        self.update(conversation_id, &listener_id, update).await
    }

    async fn update(
        &self,
        conversation_id: &str,
        listener_id: &str,
        update: ListenerUpdate,
    ) -> ToolResult {
        let existing = self.owned(conversation_id, listener_id).await?;
        if update.is_empty() {
            return Ok(json!({"success": true, "message": "No changes requested"}));
        }

        let mut candidate = existing.clone();
        update.apply(&mut candidate);

        let mut warnings = Vec::new();
        if candidate.match_conditions != existing.match_conditions {
            let source = self.source(&candidate.source_id).await?;
            warnings = self
                .validate_conditions(source.as_ref(), &candidate.match_conditions)
                .await?;
        }
        self.check_scripts(
            candidate.condition_script(),
            candidate.action_type,
            &candidate.action_config,
        )?;

        let updated = self.store.update(listener_id, update).await?;
        self.processor.invalidate_cache().await;

        Ok(with_warnings(
            json!({
                "success": true,
                "message": format!("Updated event listener '{}'", updated.name),
                "listener": updated,
            }),
            warnings,
        ))
    }

    async fn delete(&self, conversation_id: &str, listener_id: &str) -> ToolResult {
        let listener = self.owned(conversation_id, listener_id).await?;
        self.store.delete(listener_id).await?;
        self.processor.invalidate_cache().await;
        Ok(json!({
            "success": true,
            "message": format!("Deleted event listener '{}'", listener.name),
        }))
    }

    async fn toggle(&self, conversation_id: &str, listener_id: &str, enabled: bool) -> ToolResult {
        self.owned(conversation_id, listener_id).await?;
        let listener = self.store.set_enabled(listener_id, enabled).await?;
        self.processor.invalidate_cache().await;
        Ok(json!({
            "success": true,
            "enabled": listener.enabled,
            "message": format!(
                "{} event listener '{}'",
                if enabled { "Enabled" } else { "Disabled" },
                listener.name
            ),
        }))
    }
}
