//! Origin tracking for events and the actions they cause

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Context attached to every event
///
/// Actions triggered by an event run under a child context so a chain of
/// listener → action → follow-up event can be traced back to its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID, so ids sort by creation time
    pub id: String,

    /// Set when this context was derived from another one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// A root context with no parent
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Fresh id that points back at `self`
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
