//! Match-condition checks against the live entity catalog

use fa_core::path::type_name;
use fa_core::EntityId;
use serde_json::{Map, Value};
use tracing::warn;

use super::HomeAssistantApi;
use crate::validation::{check_structure, find_similar, ValidationError, ValidationResult};

const STATE_FIELDS: [&str; 2] = ["old_state.state", "new_state.state"];

pub(crate) async fn validate_conditions<A>(
    api: &A,
    conditions: &Map<String, Value>,
) -> ValidationResult
where
    A: HomeAssistantApi + ?Sized,
{
    let mut result = check_structure(conditions);

    for field in STATE_FIELDS {
        if let Some(value) = conditions.get(field) {
            if !value.is_string() && !value.is_null() {
                result.add_error(
                    ValidationError::new(
                        field,
                        value.clone(),
                        format!("{field} must be a string, got {}", type_name(value)),
                    )
                    .with_suggestion(format!("Home Assistant states are strings, use \"{value}\"")),
                );
            }
        }
    }

    let Some(entity_id) = conditions.get("entity_id").and_then(Value::as_str) else {
        return result;
    };

    if let Err(e) = entity_id.parse::<EntityId>() {
        let mut error = ValidationError::new(
            "entity_id",
            Value::String(entity_id.to_string()),
            format!("Invalid entity_id format: {e}"),
        );
        if let Some(normalized) = EntityId::normalized(entity_id) {
            error = error.with_suggestion(format!("Did you mean '{normalized}'?"));
        }
        result.add_error(error);
        return result;
    }

    match api.entity_ids().await {
        Ok(known) => {
            if !known.iter().any(|id| id == entity_id) {
                let similar = find_similar(entity_id, known.iter().map(String::as_str));
                result.add_error(
                    ValidationError::new(
                        "entity_id",
                        Value::String(entity_id.to_string()),
                        format!("Entity '{entity_id}' not found in Home Assistant"),
                    )
                    .with_similar(similar),
                );
            }
        }
        Err(e) => {
            warn!(entity_id = %entity_id, error = %e, "Could not fetch entity catalog");
            result.add_warning(format!("Could not verify that '{entity_id}' exists: {e}"));
        }
    }

    result
}
