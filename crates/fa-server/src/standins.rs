//! Collaborators that live outside this service
//!
//! The assistant's chat loop and tool registry are not part of this
//! process; these stand-ins log what would have been sent to them.

use async_trait::async_trait;
use fa_processor::{ActionResult, LlmWaker, WakeRequest};
use fa_script::{ToolError, ToolExecutor, ToolInfo};
use serde_json::Value;
use tracing::info;

/// Logs wake-ups instead of starting an assistant turn
pub struct LoggingWaker;

#[async_trait]
impl LlmWaker for LoggingWaker {
    async fn wake(&self, request: WakeRequest) -> ActionResult<()> {
        info!(
            conversation_id = %request.conversation_id,
            listener_id = %request.listener_id,
            "Wake-up for listener '{}': {}",
            request.listener_name,
            request.message
        );
        Ok(())
    }
}

/// Tool registry with no tools
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    async fn list_tools(&self) -> Vec<ToolInfo> {
        Vec::new()
    }

    async fn execute(&self, name: &str, _args: Value) -> Result<Value, ToolError> {
        Err(ToolError::NotFound {
            name: name.to_string(),
        })
    }
}
