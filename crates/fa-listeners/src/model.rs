//! Event listener records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// What a listener does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Start an LLM turn in the listener's conversation
    WakeLlm,
    /// Run the action script from `action_config.script_code`
    Script,
    /// Invoke the tool named in `action_config.tool_name`
    Tool,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::WakeLlm, ActionType::Script, ActionType::Tool];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::WakeLlm => "wake_llm",
            ActionType::Script => "script",
            ActionType::Tool => "tool",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown action type '{}', expected one of: wake_llm, script, tool",
                    s
                )
            })
    }
}

/// A persisted rule binding a source, a condition and an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventListener {
    /// Listener id (ULID)
    pub id: String,

    /// Name, unique within the conversation
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Source whose events this listener watches
    pub source_id: String,

    /// Dotted-path equality conditions, all of which must hold
    #[serde(default)]
    pub match_conditions: Map<String, Value>,

    /// Boolean script; takes precedence over `match_conditions` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_script: Option<String>,

    pub action_type: ActionType,

    #[serde(default)]
    pub action_config: Value,

    pub enabled: bool,

    /// Conversation that owns the listener and receives wake-ups
    pub conversation_id: String,

    /// Disable after the first successful trigger
    #[serde(default)]
    pub one_time: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,

    #[serde(default)]
    pub trigger_count: u64,
}

impl EventListener {
    /// Materialize a new listener with a fresh id
    pub fn from_new(new: NewListener, now: DateTime<Utc>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            name: new.name,
            description: new.description,
            source_id: new.source_id,
            match_conditions: new.match_conditions,
            condition_script: new.condition_script,
            action_type: new.action_type,
            action_config: new.action_config,
            enabled: new.enabled,
            conversation_id: new.conversation_id,
            one_time: new.one_time,
            created_at: now,
            updated_at: now,
            last_triggered: None,
            trigger_count: 0,
        }
    }

    /// Condition script to evaluate, ignoring blank scripts
    pub fn condition_script(&self) -> Option<&str> {
        self.condition_script
            .as_deref()
            .filter(|code| !code.trim().is_empty())
    }
}

/// Fields supplied when creating a listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListener {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_id: String,
    #[serde(default)]
    pub match_conditions: Map<String, Value>,
    #[serde(default)]
    pub condition_script: Option<String>,
    pub action_type: ActionType,
    #[serde(default)]
    pub action_config: Value,
    pub conversation_id: String,
    #[serde(default)]
    pub one_time: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewListener {
    /// Listener that wakes the LLM, with no conditions yet
    pub fn new(
        name: impl Into<String>,
        source_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            source_id: source_id.into(),
            match_conditions: Map::new(),
            condition_script: None,
            action_type: ActionType::WakeLlm,
            action_config: Value::Object(Map::new()),
            conversation_id: conversation_id.into(),
            one_time: false,
            enabled: true,
        }
    }

    pub fn with_condition(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.match_conditions.insert(path.into(), value.into());
        self
    }

    pub fn with_script(mut self, code: impl Into<String>) -> Self {
        self.condition_script = Some(code.into());
        self
    }

    pub fn with_action(mut self, action_type: ActionType, config: Value) -> Self {
        self.action_type = action_type;
        self.action_config = config;
        self
    }

    pub fn one_time(mut self) -> Self {
        self.one_time = true;
        self
    }
}

/// Partial update; `None` leaves a field unchanged
///
/// `condition_script: Some(None)` clears the script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub match_conditions: Option<Map<String, Value>>,
    #[serde(default, with = "double_option")]
    pub condition_script: Option<Option<String>>,
    #[serde(default)]
    pub action_type: Option<ActionType>,
    #[serde(default)]
    pub action_config: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub one_time: Option<bool>,
}

impl ListenerUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the update, returning whether anything changed
    pub fn apply(&self, listener: &mut EventListener) -> bool {
        let before = listener.clone();

        if let Some(name) = &self.name {
            listener.name = name.clone();
        }
        if let Some(description) = &self.description {
            listener.description = Some(description.clone());
        }
        if let Some(conditions) = &self.match_conditions {
            listener.match_conditions = conditions.clone();
        }
        if let Some(script) = &self.condition_script {
            listener.condition_script = script.clone();
        }
        if let Some(action_type) = self.action_type {
            listener.action_type = action_type;
        }
        if let Some(config) = &self.action_config {
            listener.action_config = config.clone();
        }
        if let Some(enabled) = self.enabled {
            listener.enabled = enabled;
        }
        if let Some(one_time) = self.one_time {
            listener.one_time = one_time;
        }

        *listener != before
    }
}

/// Distinguishes an absent field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Query filter for listing listeners
#[derive(Debug, Clone, Default)]
pub struct ListenerFilter {
    pub conversation_id: Option<String>,
    pub source_id: Option<String>,
    pub enabled: Option<bool>,
}

impl ListenerFilter {
    pub fn conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, listener: &EventListener) -> bool {
        self.conversation_id
            .as_ref()
            .map_or(true, |c| *c == listener.conversation_id)
            && self
                .source_id
                .as_ref()
                .map_or(true, |s| *s == listener.source_id)
            && self.enabled.map_or(true, |e| e == listener.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_wire_format() {
        assert_eq!(serde_json::to_value(ActionType::WakeLlm).unwrap(), json!("wake_llm"));
        assert_eq!("tool".parse::<ActionType>().unwrap(), ActionType::Tool);
        assert!("email".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_blank_script_is_ignored() {
        let new = NewListener::new("x", "webhook", "c1").with_script("   ");
        let listener = EventListener::from_new(new, Utc::now());
        assert_eq!(listener.condition_script(), None);
    }

    #[test]
    fn test_update_clears_script_only_when_explicit() {
        let new = NewListener::new("x", "webhook", "c1").with_script("true");
        let mut listener = EventListener::from_new(new, Utc::now());

        let update: ListenerUpdate = serde_json::from_value(json!({"enabled": false})).unwrap();
        assert!(update.apply(&mut listener));
        assert_eq!(listener.condition_script.as_deref(), Some("true"));

        let update: ListenerUpdate =
            serde_json::from_value(json!({"condition_script": null})).unwrap();
        assert!(update.apply(&mut listener));
        assert_eq!(listener.condition_script, None);

        assert!(!ListenerUpdate::default().apply(&mut listener));
    }

    #[test]
    fn test_filter() {
        let listener = EventListener::from_new(NewListener::new("x", "webhook", "c1"), Utc::now());
        assert!(ListenerFilter::conversation("c1").matches(&listener));
        assert!(!ListenerFilter::conversation("c2").matches(&listener));
        assert!(!ListenerFilter {
            enabled: Some(false),
            ..Default::default()
        }
        .matches(&listener));
    }
}
