use fa_listeners::{ActionType, StoreError};
use fa_script::{ScriptError, ToolError};
use fa_sources::SourceError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while running a listener's action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no handler registered for action type '{action_type}'")]
    Unsupported { action_type: ActionType },

    #[error("invalid action_config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to wake the assistant: {0}")]
    Wake(String),

    #[error("tool '{tool}' needs confirmation but no confirmation channel is configured")]
    ConfirmationUnavailable { tool: String },

    #[error("confirmation for tool '{tool}' timed out")]
    ConfirmationTimeout { tool: String },

    #[error("action timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl ActionError {
    /// Whether a later attempt could succeed without changing the listener
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::Script(e) => e.is_retryable(),
            ActionError::Tool(ToolError::Failed { .. })
            | ActionError::Wake(_)
            | ActionError::ConfirmationTimeout { .. }
            | ActionError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// Errors raised by processor lifecycle operations
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("a source with id '{source_id}' is already registered")]
    DuplicateSource { source_id: String },

    #[error("sources cannot be added while the processor is running")]
    Running,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
