//! Sandboxed scripts for event listeners
//!
//! Listeners can carry two kinds of script:
//!
//! - **Condition scripts** decide whether an event matches. They see the
//!   event payload as `event` plus time helpers and must produce a boolean.
//! - **Action scripts** run when a listener fires. They additionally get
//!   `print(...)`, caller bindings such as `listener` and `conversation_id`,
//!   and the `tools_list`/`tools_get`/`tools_execute` functions.
//!
//! Expressions use minijinja syntax (`and`, `or`, `not`, `==`, attribute and
//! index access, list/dict literals, filters). See [`ScriptEngine`].

mod engine;
mod error;
mod globals;
mod program;
mod tools;

pub use engine::{ScriptEngine, ScriptLimits, ScriptOutput};
pub use error::{ScriptError, ScriptErrorKind, ScriptResult};
pub use globals::{ScriptDateTime, ScriptDuration};
pub use tools::{ToolError, ToolExecutor, ToolInfo};
