//! Listener condition evaluation
//!
//! A listener matches an event either through its condition script, when it
//! has one, or through its JSON match conditions. Match conditions are dotted
//! paths compared for exact equality; every key must resolve and match.

use fa_core::{path, Event};
use fa_listeners::EventListener;
use fa_script::{ScriptEngine, ScriptResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{trace, warn};

/// True when every condition path resolves in `data` to an equal value
pub fn match_conditions(conditions: &Map<String, Value>, data: &Value) -> bool {
    conditions
        .iter()
        .all(|(key, expected)| path::lookup(data, key) == Some(expected))
}

/// Decides whether listeners match events
pub struct ConditionEvaluator {
    engine: Arc<ScriptEngine>,
}

impl ConditionEvaluator {
    pub fn new(engine: Arc<ScriptEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    /// Evaluate a listener's condition, surfacing script errors
    pub async fn evaluate(&self, listener: &EventListener, event: &Event) -> ScriptResult<bool> {
        match listener.condition_script() {
            Some(code) => self.engine.evaluate_condition(code, event).await,
            None => Ok(match_conditions(&listener.match_conditions, &event.data)),
        }
    }

    /// Evaluate a listener's condition; an unevaluable condition is no match
    pub async fn matches(&self, listener: &EventListener, event: &Event) -> bool {
        match self.evaluate(listener, event).await {
            Ok(matched) => {
                trace!(listener_id = %listener.id, matched, "Evaluated listener condition");
                matched
            }
            Err(e) => {
                warn!(
                    listener_id = %listener.id,
                    error_kind = ?e.kind(),
                    error = %e,
                    "Condition script failed, treating as no match"
                );
                false
            }
        }
    }

    /// Static checks on a condition script before it is stored
    pub fn validate_script(&self, code: &str) -> ScriptResult<()> {
        self.engine.validate(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fa_listeners::NewListener;
    use fa_script::{ScriptError, ScriptLimits};
    use chrono::Utc;
    use serde_json::json;

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(ScriptEngine::new(ScriptLimits::default())))
    }

    fn listener(new: NewListener) -> EventListener {
        EventListener::from_new(new, Utc::now())
    }

    #[test]
    fn test_match_conditions_dotted_paths() {
        let data = json!({
            "entity_id": "light.kitchen",
            "new_state": {"state": "on", "attributes": {"brightness": 255}}
        });

        let conditions = json!({"entity_id": "light.kitchen", "new_state.state": "on"});
        assert!(match_conditions(conditions.as_object().unwrap(), &data));

        let conditions = json!({"new_state.attributes.brightness": 255});
        assert!(match_conditions(conditions.as_object().unwrap(), &data));

        let conditions = json!({"new_state.state": "off"});
        assert!(!match_conditions(conditions.as_object().unwrap(), &data));

        // Missing path never matches, even against null
        let conditions = json!({"old_state.state": null});
        assert!(!match_conditions(conditions.as_object().unwrap(), &data));

        assert!(match_conditions(&Map::new(), &data));
    }

    #[test]
    fn test_match_conditions_exact_types() {
        let data = json!({"count": 1});
        let conditions = json!({"count": "1"});
        assert!(!match_conditions(conditions.as_object().unwrap(), &data));
    }

    #[tokio::test]
    async fn test_script_takes_precedence() {
        let evaluator = evaluator();
        let listener = listener(
            NewListener::new("arrival", "home_assistant", "c1")
                .with_condition("entity_id", "someone.else")
                .with_script("event.new_state.state == 'home'"),
        );
        let event = Event::new(
            "home_assistant",
            json!({"entity_id": "person.test", "new_state": {"state": "home"}}),
        );
        assert!(evaluator.matches(&listener, &event).await);
    }

    #[tokio::test]
    async fn test_blank_script_falls_back_to_conditions() {
        let evaluator = evaluator();
        let listener = listener(
            NewListener::new("a", "webhook", "c1")
                .with_condition("kind", "doorbell")
                .with_script("   "),
        );
        let event = Event::new("webhook", json!({"kind": "doorbell"}));
        assert!(evaluator.matches(&listener, &event).await);
    }

    #[tokio::test]
    async fn test_script_error_is_no_match() {
        let evaluator = evaluator();
        let listener = listener(NewListener::new("a", "webhook", "c1").with_script("event.kind"));
        let event = Event::new("webhook", json!({"kind": "doorbell"}));

        let err = evaluator.evaluate(&listener, &event).await.unwrap_err();
        assert!(matches!(err, ScriptError::NonBoolean { .. }));
        assert!(!evaluator.matches(&listener, &event).await);
    }
}
