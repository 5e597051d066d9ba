//! Core types for the event listener pipeline
//!
//! This crate provides the types shared by every other crate in the workspace:
//! the [`Event`] envelope handed from sources to the processor, the causality
//! [`Context`], the validated [`EntityId`] used by Home Assistant listeners, and
//! dotted-path lookup over loosely structured event payloads.

mod context;
mod entity_id;
mod event;
pub mod path;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use event::Event;

/// Well-known source identifiers
pub mod sources {
    /// Passive source fed by HTTP webhook pushes
    pub const WEBHOOK: &str = "webhook";

    /// Home Assistant state-change stream
    pub const HOME_ASSISTANT: &str = "home_assistant";

    /// Document indexing pipeline completions
    pub const INDEXING: &str = "indexing";
}
