//! Tool capability surface for action scripts
//!
//! Action scripts may call `tools_list()`, `tools_get(name)` and
//! `tools_execute(name, args)`. Condition scripts never receive these
//! functions.

use async_trait::async_trait;
use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Description of a tool that scripts and listeners can invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Whether a human must approve each call
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Errors raised by tool execution
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool not found: {name}")]
    NotFound { name: String },

    #[error("tool {name} failed: {message}")]
    Failed { name: String, message: String },

    #[error("tool {name} was not approved")]
    Denied { name: String },
}

/// Executes tools on behalf of scripts and listener actions
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// All tools available to automations
    async fn list_tools(&self) -> Vec<ToolInfo>;

    /// Look up one tool by name
    async fn get_tool(&self, name: &str) -> Option<ToolInfo> {
        self.list_tools()
            .await
            .into_iter()
            .find(|tool| tool.name == name)
    }

    /// Run a tool with JSON arguments
    async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("value is not JSON serializable: {}", e),
        )
    })
}

/// Wall-clock allowance shared by every tool call of one script run
pub(crate) struct ToolBudget {
    deadline: Instant,
    expired: AtomicBool,
}

impl ToolBudget {
    pub(crate) fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
            expired: AtomicBool::new(false),
        }
    }

    /// Whether a tool call was cut off by the deadline
    pub(crate) fn expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Run `fut` on the runtime from the blocking worker, giving up at the deadline
    ///
    /// The engine's timeout only stops waiting for the worker; this bound is
    /// what frees the worker thread when a tool hangs.
    fn block_on<F: Future>(&self, handle: &Handle, fut: F) -> Result<F::Output, Error> {
        handle
            .block_on(tokio::time::timeout_at(self.deadline, fut))
            .map_err(|_| {
                self.expired.store(true, Ordering::Release);
                Error::new(
                    ErrorKind::InvalidOperation,
                    "tool call exceeded the script time limit",
                )
            })
    }
}

/// Register `tools_*` functions bridging to the async executor
///
/// Script evaluation runs on a blocking worker, so each call blocks on the
/// runtime handle until the tool finishes or the budget runs out.
pub(crate) fn register_tools(
    env: &mut Environment<'static>,
    tools: Arc<dyn ToolExecutor>,
    handle: Handle,
    budget: Arc<ToolBudget>,
) {
    let list_tools = tools.clone();
    let list_handle = handle.clone();
    let list_budget = budget.clone();
    env.add_function("tools_list", move || -> Result<Value, Error> {
        let listed = list_budget.block_on(&list_handle, list_tools.list_tools())?;
        Ok(Value::from_serialize(&listed))
    });

    let get_tools = tools.clone();
    let get_handle = handle.clone();
    let get_budget = budget.clone();
    env.add_function("tools_get", move |name: String| -> Result<Value, Error> {
        let tool = get_budget.block_on(&get_handle, get_tools.get_tool(&name))?;
        Ok(Value::from_serialize(&tool))
    });

    env.add_function(
        "tools_execute",
        move |name: String, args: Option<Value>| -> Result<Value, Error> {
            let args = match args {
                Some(args) => to_json(&args)?,
                None => serde_json::Value::Object(Default::default()),
            };
            debug!(tool = %name, "Script executing tool");
            let result = budget
                .block_on(&handle, tools.execute(&name, args))?
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
            Ok(Value::from_serialize(&result))
        },
    );
}

/// Register `print(...)`, collecting lines into `sink`
pub(crate) fn register_print(env: &mut Environment<'static>, sink: Arc<Mutex<Vec<String>>>) {
    env.add_function("print", move |args: Rest<Value>| -> Value {
        let line = args
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "fa_script::print", "{}", line);
        if let Ok(mut lines) = sink.lock() {
            lines.push(line);
        }
        Value::from(())
    });
}
