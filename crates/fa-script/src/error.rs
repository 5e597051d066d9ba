//! Error types for script validation and execution

use std::time::Duration;
use thiserror::Error;

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Coarse classification used by callers to decide retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// Rejected before execution; never retried
    Syntax,
    /// Runtime failure or wrong result type
    Execution,
    /// Exceeded the wall-clock bound
    Timeout,
}

/// Errors that can occur while validating or running a script
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Script exceeds the configured size limit
    #[error("Script too large: {size} bytes (max {limit} bytes)")]
    TooLarge { size: usize, limit: usize },

    /// Script failed to parse
    #[error("script syntax error: {message}")]
    Syntax { message: String },

    /// Script failed while running
    #[error("script execution error: {message}")]
    Execution { message: String },

    /// Condition script produced something other than a boolean
    #[error("script execution error: condition script must return boolean, got {type_name}")]
    NonBoolean { type_name: String },

    /// Script did not finish in time
    #[error("script timed out after {}s", timeout.as_secs_f64())]
    Timeout { timeout: Duration },
}

impl ScriptError {
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ScriptErrorKind {
        match self {
            Self::TooLarge { .. } | Self::Syntax { .. } => ScriptErrorKind::Syntax,
            Self::Execution { .. } | Self::NonBoolean { .. } => ScriptErrorKind::Execution,
            Self::Timeout { .. } => ScriptErrorKind::Timeout,
        }
    }

    /// Whether a background task running this script may try again
    ///
    /// Static problems and wrong return types are permanent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::Timeout { .. })
    }
}

impl From<minijinja::Error> for ScriptError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => ScriptError::Syntax {
                message: err.to_string(),
            },
            minijinja::ErrorKind::OutOfFuel => ScriptError::Execution {
                message: "script exceeded its instruction budget".to_string(),
            },
            _ => ScriptError::Execution {
                message: err.to_string(),
            },
        }
    }
}
