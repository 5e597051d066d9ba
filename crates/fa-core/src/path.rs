//! Dotted-path lookup over JSON payloads
//!
//! Match conditions address event fields with paths such as
//! `new_state.state` or `attributes.tags.0`. A path that does not resolve is
//! reported as `None`; callers never receive a substituted default.

use serde_json::Value;

/// Resolve `path` against `value`
///
/// A top-level key that literally contains dots wins over traversal, so a
/// webhook payload `{"a.b": 1}` matches the path `a.b`. Otherwise each
/// segment indexes an object by key or an array by position.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = value.as_object().and_then(|map| map.get(path)) {
        return Some(direct);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// User-facing name of a JSON value's type
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_lookup() {
        let event = json!({"new_state": {"state": "home", "attributes": {"zones": ["a", "b"]}}});
        assert_eq!(lookup(&event, "new_state.state"), Some(&json!("home")));
        assert_eq!(
            lookup(&event, "new_state.attributes.zones.1"),
            Some(&json!("b"))
        );
    }

    #[test]
    fn test_missing_segments() {
        let event = json!({"new_state": {"state": "home"}});
        assert_eq!(lookup(&event, "old_state.state"), None);
        assert_eq!(lookup(&event, "new_state.state.deeper"), None);
        assert_eq!(lookup(&event, "new_state.attributes.zones.x"), None);
    }

    #[test]
    fn test_literal_dotted_key_wins() {
        let event = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(lookup(&event, "a.b"), Some(&json!(1)));
    }

    #[test]
    fn test_null_is_found_not_missing() {
        let event = json!({"old_state": null});
        assert_eq!(lookup(&event, "old_state"), Some(&Value::Null));
        assert_eq!(lookup(&event, "old_state.state"), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(&json!(12345)), "int");
        assert_eq!(type_name(&json!(1.5)), "float");
        assert_eq!(type_name(&json!("x")), "string");
        assert_eq!(type_name(&json!([1])), "list");
        assert_eq!(type_name(&json!({})), "dict");
        assert_eq!(type_name(&json!(null)), "null");
        assert_eq!(type_name(&json!(true)), "bool");
    }
}
