//! Script engine for listener conditions and actions
//!
//! Scripts are evaluated with a minijinja environment that only knows the
//! functions registered here: there is no filesystem, network or template
//! loader. Every evaluation is bounded by a fuel budget inside the
//! interpreter and by a wall-clock timeout around the blocking worker.

use fa_core::{path, Event};
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{ScriptError, ScriptResult};
use crate::globals;
use crate::program::{self, Program, Statement};
use crate::tools::{self, ToolBudget, ToolExecutor};

/// Resource limits applied to every script
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    /// Maximum script size in bytes
    pub max_script_bytes: usize,
    /// Wall-clock bound on one evaluation
    pub timeout: Duration,
    /// Interpreter instruction budget per expression
    pub fuel: u64,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_script_bytes: 10 * 1024,
            timeout: Duration::from_secs(5),
            fuel: 100_000,
        }
    }
}

/// Result of an action script
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    /// Returned value, `null` when the script has no `return`
    pub value: serde_json::Value,
    /// Lines written with `print(...)`
    pub printed: Vec<String>,
}

/// Sandboxed script engine
pub struct ScriptEngine {
    limits: ScriptLimits,
    condition_env: Arc<Environment<'static>>,
}

impl ScriptEngine {
    pub fn new(limits: ScriptLimits) -> Self {
        let condition_env = Arc::new(Self::base_environment(&limits));
        Self {
            limits,
            condition_env,
        }
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Environment with the time helpers shared by conditions and actions
    fn base_environment(limits: &ScriptLimits) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_fuel(Some(limits.fuel));

        env.add_function("now", globals::now);
        env.add_function("utcnow", globals::utcnow);
        env.add_function("timedelta", globals::timedelta);
        env.add_function("as_timestamp", globals::as_timestamp);
        env.add_function("as_datetime", globals::as_datetime);
        env.add_function("time_since", globals::time_since);

        env
    }

    fn check_size(&self, code: &str) -> ScriptResult<()> {
        let size = code.len();
        if size > self.limits.max_script_bytes {
            return Err(ScriptError::TooLarge {
                size,
                limit: self.limits.max_script_bytes,
            });
        }
        Ok(())
    }

    fn prepare(&self, code: &str) -> ScriptResult<Program> {
        self.check_size(code)?;
        let env = &self.condition_env;
        Ok(program::parse(code)?.collapse(|expr| env.compile_expression(expr).is_ok()))
    }

    /// Static checks: size, statement structure and expression syntax
    ///
    /// Nothing is executed.
    pub fn validate(&self, code: &str) -> ScriptResult<()> {
        let program = self.prepare(code)?;
        for statement in &program.statements {
            self.condition_env
                .compile_expression(statement.expr())
                .map_err(|e| at_line(ScriptError::from(e), statement.line()))?;
        }
        Ok(())
    }

    /// Evaluate a condition script against an event
    ///
    /// The script sees the payload as `event` plus the time helpers. Its
    /// final value must be a boolean.
    pub async fn evaluate_condition(&self, code: &str, event: &Event) -> ScriptResult<bool> {
        let program = self.prepare(code)?;
        let env = self.condition_env.clone();

        let mut scope = BTreeMap::new();
        scope.insert("event".to_string(), Value::from_serialize(event.script_view()));

        let value = self
            .run_blocking(move || execute(&env, &program, scope))
            .await?;

        if value.kind() == ValueKind::Bool {
            Ok(value.is_true())
        } else {
            Err(ScriptError::NonBoolean {
                type_name: describe(&value),
            })
        }
    }

    /// Run an action script
    ///
    /// Every key of `bindings` (normally `event`, `listener` and
    /// `conversation_id`) becomes a global. `tools` adds the `tools_*`
    /// functions; `print` is always available.
    pub async fn run_action(
        &self,
        code: &str,
        bindings: serde_json::Value,
        tools: Option<Arc<dyn ToolExecutor>>,
    ) -> ScriptResult<ScriptOutput> {
        let program = self.prepare(code)?;

        let printed = Arc::new(Mutex::new(Vec::new()));
        let mut env = Self::base_environment(&self.limits);
        tools::register_print(&mut env, printed.clone());
        let budget = Arc::new(ToolBudget::new(self.limits.timeout));
        if let Some(tools) = tools {
            tools::register_tools(&mut env, tools, Handle::current(), budget.clone());
        }

        let scope: BTreeMap<String, Value> = match bindings {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, Value::from_serialize(&v)))
                .collect(),
            serde_json::Value::Null => BTreeMap::new(),
            other => {
                return Err(ScriptError::execution(format!(
                    "script bindings must be an object, got {}",
                    path::type_name(&other)
                )))
            }
        };

        let outcome = self
            .run_blocking(move || {
                execute(&env, &program, scope).and_then(|value| {
                    serde_json::to_value(&value).map_err(|e| {
                        ScriptError::execution(format!("result is not JSON serializable: {}", e))
                    })
                })
            })
            .await;
        if budget.expired() {
            warn!(timeout_secs = self.limits.timeout.as_secs_f64(), "Tool call timed out");
            return Err(ScriptError::Timeout {
                timeout: self.limits.timeout,
            });
        }
        let value = outcome?;

        let printed = printed.lock().map(|lines| lines.clone()).unwrap_or_default();
        Ok(ScriptOutput { value, printed })
    }

    async fn run_blocking<T, F>(&self, f: F) -> ScriptResult<T>
    where
        F: FnOnce() -> ScriptResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.limits.timeout;
        match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ScriptError::execution(format!("script worker failed: {}", e))),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "Script timed out");
                Err(ScriptError::Timeout { timeout })
            }
        }
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

fn at_line(err: ScriptError, line: usize) -> ScriptError {
    match err {
        ScriptError::Syntax { message } => ScriptError::Syntax {
            message: format!("line {}: {}", line, message),
        },
        ScriptError::Execution { message } => ScriptError::Execution {
            message: format!("line {}: {}", line, message),
        },
        other => other,
    }
}

fn eval(
    env: &Environment<'static>,
    expr: &str,
    scope: &BTreeMap<String, Value>,
) -> ScriptResult<Value> {
    let compiled = env.compile_expression(expr)?;
    Ok(compiled.eval(scope)?)
}

fn execute(
    env: &Environment<'static>,
    program: &Program,
    mut scope: BTreeMap<String, Value>,
) -> ScriptResult<Value> {
    for statement in &program.statements {
        let line = statement.line();
        match statement {
            Statement::Assign { name, expr, .. } => {
                let value = eval(env, expr, &scope).map_err(|e| at_line(e, line))?;
                debug!(name = %name, "Script assignment");
                scope.insert(name.clone(), value);
            }
            Statement::Expr { expr, .. } => {
                eval(env, expr, &scope).map_err(|e| at_line(e, line))?;
            }
            Statement::Return { expr, .. } => {
                return eval(env, expr, &scope).map_err(|e| at_line(e, line));
            }
        }
    }
    Ok(Value::from(()))
}

/// User-facing type name of a script value
fn describe(value: &Value) -> String {
    if value.is_undefined() {
        return "undefined".to_string();
    }
    match serde_json::to_value(value) {
        Ok(json) => path::type_name(&json).to_string(),
        Err(_) => "object".to_string(),
    }
}
