mod common;

use common::{state_change, TestProcessor, UNREACHABLE};
use fa_core::sources::{HOME_ASSISTANT, WEBHOOK};
use fa_listeners::ListenerStore;
use fa_processor::ProcessorConfig;
use serde_json::json;

#[tokio::test]
async fn test_unknown_entity_suggests_similar() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "alex home",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": "person.alex"},
            }),
        )
        .await;

    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "Validation failed");
    let error = &response["validation_errors"][0];
    assert_eq!(error["field"], "entity_id");
    assert_eq!(error["error"], "Entity 'person.alex' not found in Home Assistant");
    assert_eq!(error["suggestion"], "Did you mean 'person.alexander'?");
    assert_eq!(error["similar_values"], json!(["person.alexander"]));
    assert_eq!(harness.store.len(), 0);
}

#[tokio::test]
async fn test_numeric_entity_id_rejected() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "numeric",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": 12345},
            }),
        )
        .await;

    assert_eq!(response["success"], false);
    let message = response["validation_errors"][0]["error"].as_str().unwrap();
    assert!(message.contains("must be a string"), "{message}");
    assert!(message.contains("got int"), "{message}");
}

#[tokio::test]
async fn test_every_bad_field_is_reported() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "two bad fields",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": 12345, "new_state.state": 5},
            }),
        )
        .await;

    assert_eq!(response["success"], false);
    let errors = response["validation_errors"].as_array().unwrap();
    let fields: Vec<_> = errors.iter().map(|e| e["field"].as_str().unwrap()).collect();
    assert_eq!(fields.len(), 2, "{errors:?}");
    assert!(fields.contains(&"entity_id"));
    assert!(fields.contains(&"new_state.state"));
}

#[tokio::test]
async fn test_structure_checked_for_sources_without_validation() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "numeric",
                "source_id": WEBHOOK,
                "match_conditions": {"entity_id": 7},
            }),
        )
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "Validation failed");
}

#[tokio::test]
async fn test_validation_backend_failure_is_a_warning() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "anything",
                "source_id": UNREACHABLE,
                "match_conditions": {"kind": "ping"},
            }),
        )
        .await;

    assert_eq!(response["success"], true, "{response}");
    let warning = response["warnings"][0].as_str().unwrap();
    assert!(warning.contains("validation backend unavailable"), "{warning}");
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn test_missing_entity_catalog_is_a_warning() {
    let harness = TestProcessor::start_with(None, ProcessorConfig::default()).await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({
                "name": "arrival",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": "person.test"},
            }),
        )
        .await;

    assert_eq!(response["success"], true, "{response}");
    assert!(response["warnings"][0]
        .as_str()
        .unwrap()
        .contains("Could not verify that 'person.test' exists"));
}

#[tokio::test]
async fn test_unknown_source_rejected() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({"name": "mqtt", "source_id": "mqtt"}),
        )
        .await;
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("Unknown source 'mqtt'"));
}

#[tokio::test]
async fn test_bad_condition_script_rejected() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({"name": "broken", "source_id": WEBHOOK, "condition_script": "event.value >"}),
        )
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_type"], "syntax");
}

#[tokio::test]
async fn test_script_action_requires_code() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({"name": "empty", "source_id": WEBHOOK, "action_type": "script"}),
        )
        .await;
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid action"));
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let harness = TestProcessor::start().await;
    harness
        .create("c1", json!({"name": "hook", "source_id": WEBHOOK}))
        .await;
    let response = harness
        .listener_tools
        .call(
            "create_event_listener",
            "c1",
            json!({"name": "hook", "source_id": WEBHOOK}),
        )
        .await;
    assert_eq!(response["success"], false);

    // Names are scoped to a conversation
    harness
        .create("c2", json!({"name": "hook", "source_id": WEBHOOK}))
        .await;
}

#[tokio::test]
async fn test_list_is_scoped_to_conversation() {
    let harness = TestProcessor::start().await;
    harness
        .create("c1", json!({"name": "a", "source_id": WEBHOOK}))
        .await;
    harness
        .create("c1", json!({"name": "b", "source_id": HOME_ASSISTANT}))
        .await;
    harness
        .create("c2", json!({"name": "c", "source_id": WEBHOOK}))
        .await;

    let all = harness
        .listener_tools
        .call("list_event_listeners", "c1", json!({}))
        .await;
    assert_eq!(all["success"], true);
    assert_eq!(all["count"], 2);

    let webhook_only = harness
        .listener_tools
        .call("list_event_listeners", "c1", json!({"source_id": WEBHOOK}))
        .await;
    assert_eq!(webhook_only["count"], 1);
    assert_eq!(webhook_only["listeners"][0]["name"], "a");
}

#[tokio::test]
async fn test_update_takes_effect_on_next_event() {
    let harness = TestProcessor::start().await;
    let id = harness
        .create(
            "c1",
            json!({
                "name": "watch",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": "person.test"},
            }),
        )
        .await;

    let response = harness
        .listener_tools
        .call(
            "update_event_listener",
            "c1",
            json!({"listener_id": id, "match_conditions": {"entity_id": "light.kitchen"}}),
        )
        .await;
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["listener"]["match_conditions"]["entity_id"], "light.kitchen");

    let person = harness
        .processor
        .handle_event(HOME_ASSISTANT, state_change("person.test", "not_home", "home"))
        .await;
    assert_eq!(person.matched, 0);

    let light = harness
        .processor
        .handle_event(HOME_ASSISTANT, state_change("light.kitchen", "off", "on"))
        .await;
    assert_eq!(light.dispatched, 1);
}

#[tokio::test]
async fn test_invalid_update_leaves_listener_unchanged() {
    let harness = TestProcessor::start().await;
    let id = harness
        .create(
            "c1",
            json!({
                "name": "watch",
                "source_id": HOME_ASSISTANT,
                "match_conditions": {"entity_id": "person.test"},
            }),
        )
        .await;

    let response = harness
        .listener_tools
        .call(
            "update_event_listener",
            "c1",
            json!({"listener_id": id, "match_conditions": {"entity_id": "light.kitchn"}}),
        )
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(
        response["validation_errors"][0]["suggestion"],
        "Did you mean 'light.kitchen'?"
    );

    let listener = harness.store.get(&id).await.unwrap().unwrap();
    assert_eq!(listener.match_conditions["entity_id"], "person.test");
}

#[tokio::test]
async fn test_clearing_condition_script() {
    let harness = TestProcessor::start().await;
    let id = harness
        .create(
            "c1",
            json!({"name": "never", "source_id": WEBHOOK, "condition_script": "false"}),
        )
        .await;
    assert_eq!(harness.processor.handle_event(WEBHOOK, json!({})).await.matched, 0);

    let response = harness
        .listener_tools
        .call(
            "update_event_listener",
            "c1",
            json!({"listener_id": id, "condition_script": null}),
        )
        .await;
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(harness.processor.handle_event(WEBHOOK, json!({})).await.matched, 1);
}

#[tokio::test]
async fn test_toggle_and_delete() {
    let harness = TestProcessor::start().await;
    let id = harness
        .create("c1", json!({"name": "hook", "source_id": WEBHOOK}))
        .await;

    let disabled = harness
        .listener_tools
        .call("toggle_event_listener", "c1", json!({"listener_id": id, "enabled": false}))
        .await;
    assert_eq!(disabled["success"], true);
    assert_eq!(disabled["message"], "Disabled event listener 'hook'");
    assert_eq!(harness.processor.handle_event(WEBHOOK, json!({})).await.evaluated, 0);

    harness
        .listener_tools
        .call("toggle_event_listener", "c1", json!({"listener_id": id, "enabled": true}))
        .await;
    assert_eq!(harness.processor.handle_event(WEBHOOK, json!({})).await.evaluated, 1);

    let deleted = harness
        .listener_tools
        .call("delete_event_listener", "c1", json!({"listener_id": id}))
        .await;
    assert_eq!(deleted["success"], true);
    assert_eq!(harness.store.len(), 0);
    assert_eq!(harness.processor.handle_event(WEBHOOK, json!({})).await.evaluated, 0);
}

#[tokio::test]
async fn test_other_conversation_cannot_modify() {
    let harness = TestProcessor::start().await;
    let id = harness
        .create("c1", json!({"name": "hook", "source_id": WEBHOOK}))
        .await;

    for (tool, args) in [
        ("delete_event_listener", json!({"listener_id": id})),
        ("toggle_event_listener", json!({"listener_id": id, "enabled": false})),
        ("update_event_listener", json!({"listener_id": id, "name": "mine"})),
    ] {
        let response = harness.listener_tools.call(tool, "c2", args).await;
        assert_eq!(response["success"], false, "{tool}");
        assert_eq!(response["message"], format!("Event listener '{id}' not found"));
    }

    let listener = harness.store.get(&id).await.unwrap().unwrap();
    assert_eq!(listener.name, "hook");
    assert!(listener.enabled);
}

#[tokio::test]
async fn test_malformed_arguments() {
    let harness = TestProcessor::start().await;
    let response = harness
        .listener_tools
        .call("create_event_listener", "c1", json!({"source_id": WEBHOOK}))
        .await;
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid arguments"));

    let response = harness
        .listener_tools
        .call("rename_everything", "c1", json!({}))
        .await;
    assert_eq!(response["message"], "Unknown tool 'rename_everything'");
}
