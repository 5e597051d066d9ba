//! Event sources feeding the processor
//!
//! - [`WebhookSource`]: passive, fed by HTTP pushes
//! - [`IndexingSource`]: passive, fed by the document indexing pipeline
//! - [`HomeAssistantSource`]: long-lived websocket with reconnect and health checks
//!
//! Every source reports a [`SourceHealth`] to its [`EventSink`] and may
//! validate listener match conditions before a listener is stored.

mod error;
pub mod health;
pub mod home_assistant;
mod indexing;
mod passive;
mod source;
pub mod validation;
mod webhook;

pub use error::{SourceError, SourceResult};
pub use health::{Backoff, ConnectionState, HealthSnapshot, InvalidTransition, SourceHealth};
pub use home_assistant::{
    EventStream, HealthCheck, HomeAssistantApi, HomeAssistantClient, HomeAssistantSource,
    HomeAssistantSourceConfig,
};
pub use indexing::{IndexedDocument, IndexingSource};
pub use source::{EventSink, EventSource};
pub use validation::{ValidationError, ValidationResult};
pub use webhook::WebhookSource;
