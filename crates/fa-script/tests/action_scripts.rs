//! Action scripts calling tools through the async executor

use async_trait::async_trait;
use fa_script::{ScriptEngine, ScriptError, ScriptLimits, ToolError, ToolExecutor, ToolInfo};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingTools {
    calls: Mutex<Vec<(String, Value)>>,
    delay: Option<Duration>,
}

#[async_trait]
impl ToolExecutor for RecordingTools {
    async fn list_tools(&self) -> Vec<ToolInfo> {
        vec![ToolInfo {
            name: "send_message".to_string(),
            description: "Send a chat message".to_string(),
            parameters: json!({"type": "object"}),
            requires_confirmation: false,
        }]
    }

    async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if name != "send_message" {
            return Err(ToolError::NotFound {
                name: name.to_string(),
            });
        }
        self.calls.lock().unwrap().push((name.to_string(), args));
        Ok(json!({"sent": true}))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn action_script_executes_tool() {
    let engine = ScriptEngine::default();
    let tools = Arc::new(RecordingTools::default());

    let code = r#"
text = 'Arrived: ' ~ event.entity_id
result = tools_execute('send_message', {'text': text})
return result.sent
"#;
    let output = engine
        .run_action(
            code,
            json!({"event": {"entity_id": "person.test"}}),
            Some(tools.clone() as Arc<dyn ToolExecutor>),
        )
        .await
        .unwrap();

    assert_eq!(output.value, json!(true));
    let calls = tools.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, json!({"text": "Arrived: person.test"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tools_list_and_get() {
    let engine = ScriptEngine::default();
    let tools: Arc<dyn ToolExecutor> = Arc::new(RecordingTools::default());

    let output = engine
        .run_action(
            concat!(
                "names = tools_list() | map(attribute='name') | list\n",
                "return [names, tools_get('send_message').description, tools_get('nope')]",
            ),
            json!({}),
            Some(tools),
        )
        .await
        .unwrap();

    assert_eq!(
        output.value,
        json!([["send_message"], "Send a chat message", null])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_failure_is_execution_error() {
    let engine = ScriptEngine::default();
    let tools: Arc<dyn ToolExecutor> = Arc::new(RecordingTools::default());

    let err = engine
        .run_action("tools_execute('unknown_tool')", json!({}), Some(tools))
        .await
        .unwrap_err();

    assert!(matches!(err, ScriptError::Execution { .. }));
    assert!(err.to_string().contains("unknown_tool"));
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_tool_times_out() {
    let engine = ScriptEngine::new(ScriptLimits {
        timeout: Duration::from_millis(50),
        ..ScriptLimits::default()
    });
    let tools: Arc<dyn ToolExecutor> = Arc::new(RecordingTools {
        delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });

    let err = engine
        .run_action("tools_execute('send_message', {})", json!({}), Some(tools))
        .await
        .unwrap_err();

    assert!(matches!(err, ScriptError::Timeout { .. }));
    assert_eq!(err.kind(), fa_script::ScriptErrorKind::Timeout);
}

/// Never finishes on its own; flags when the runtime drops the call
#[derive(Default)]
struct HangingTools {
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ToolExecutor for HangingTools {
    async fn list_tools(&self) -> Vec<ToolInfo> {
        Vec::new()
    }

    async fn execute(&self, _name: &str, _args: Value) -> Result<Value, ToolError> {
        let _flag = SetOnDrop(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hanging_tool_is_abandoned_at_the_time_limit() {
    let engine = ScriptEngine::new(ScriptLimits {
        timeout: Duration::from_millis(100),
        ..ScriptLimits::default()
    });
    let tools = Arc::new(HangingTools::default());
    let dropped = tools.dropped.clone();

    let err = engine
        .run_action(
            "tools_execute('anything', {})",
            json!({}),
            Some(tools as Arc<dyn ToolExecutor>),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Timeout { .. }));

    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "tool call still running after the time limit");
}

#[tokio::test]
async fn action_without_tools_cannot_call_them() {
    let engine = ScriptEngine::default();
    let err = engine
        .run_action("tools_list()", json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::Execution { .. }));
}
