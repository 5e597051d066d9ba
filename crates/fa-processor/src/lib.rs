//! Event processor
//!
//! This crate connects event sources to listeners.
//!
//! # Architecture
//!
//! ```text
//! SOURCE -> EventProcessor -> CONDITION -> ActionDispatcher -> ACTION
//! ```
//!
//! - **Conditions**: match conditions or a condition script per listener
//! - **Actions**: wake the assistant, run a script, or call a tool
//! - **Tools**: listener management offered to the assistant
//!
//! # Key Types
//!
//! - [`EventProcessor`] - Owns the sources and routes their events
//! - [`ConditionEvaluator`] - Decides whether a listener matches an event
//! - [`ActionDispatcher`] - Runs a listener's action with a timeout
//! - [`PendingConfirmations`] - Tool calls waiting for user approval
//! - [`ListenerTools`] - create/list/update/delete/toggle operations

mod cache;
pub mod condition;
pub mod confirm;
mod dedup;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod tools;

pub use condition::{match_conditions, ConditionEvaluator};
pub use confirm::{ConfirmationOutcome, ConfirmationRequest, PendingConfirmations};
pub use dispatch::{
    ActionDispatcher, ActionHandler, LlmWaker, ScriptAction, ToolAction, WakeLlmAction, WakeRequest,
};
pub use error::{ActionError, ActionResult, ProcessorError, ProcessorResult};
pub use processor::{CacheStatus, EventProcessor, HealthStatus, ProcessSummary, ProcessorConfig};
pub use tools::{CreateListenerArgs, ListenerToolError, ListenerTools};
