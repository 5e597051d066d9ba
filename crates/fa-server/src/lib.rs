//! Event listener service
//!
//! Wires configuration, the listener store, event sources and the processor
//! together and exposes webhook ingestion and diagnostics over HTTP.

pub mod api;
pub mod assistant;
mod standins;

pub use api::{create_router, AppState};
pub use assistant::Assistant;
