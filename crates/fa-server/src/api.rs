//! HTTP surface
//!
//! - `POST /api/webhook/:source_id`: push a JSON payload into a webhook source
//! - `GET /api/health`: processor and source diagnostics
//! - `POST /api/tools/:tool_name`: listener management for the assistant
//! - `GET /api/confirmations`, `POST /api/confirmations/:request_id`:
//!   pending tool confirmations
//! - `GET /api/events`: recently logged events

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use fa_listeners::EventLog;
use fa_processor::{EventProcessor, HealthStatus, ListenerTools, PendingConfirmations};
use fa_sources::{SourceError, WebhookSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EventProcessor>,
    /// Webhook sources by source id
    pub webhooks: Arc<HashMap<String, Arc<WebhookSource>>>,
    pub tools: Arc<ListenerTools>,
    pub confirmations: Arc<PendingConfirmations>,
    pub event_log: Arc<dyn EventLog>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/webhook/:source_id", post(receive_webhook))
        .route("/api/health", get(health))
        .route("/api/tools/:tool_name", post(call_tool))
        .route("/api/confirmations", get(list_confirmations))
        .route("/api/confirmations/:request_id", post(resolve_confirmation))
        .route("/api/events", get(recent_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// POST /api/webhook/{source_id} - Queue a payload for the processor
async fn receive_webhook(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let source = state.webhooks.get(&source_id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown webhook source: {}", source_id),
        )
    })?;

    match source.push(payload).await {
        Ok(()) => {
            debug!(source_id = %source_id, "Accepted webhook event");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({"message": "Event accepted"})),
            ))
        }
        Err(e @ SourceError::NotRunning { .. }) => {
            Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e) => {
            warn!(source_id = %source_id, error = %e, "Failed to queue webhook event");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// GET /api/health - Always 200; unhealthy sources are reported in the body
async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.processor.get_health_status().await)
}

/// Tool invocation request
#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub arguments: Value,
}

/// POST /api/tools/{tool_name} - Run a listener tool
///
/// Tool failures are reported in the JSON body with `success: false`.
async fn call_tool(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    Json(request): Json<ToolRequest>,
) -> Json<Value> {
    let arguments = match request.arguments {
        Value::Null => json!({}),
        other => other,
    };
    Json(
        state
            .tools
            .call(&tool_name, &request.conversation_id, arguments)
            .await,
    )
}

/// GET /api/confirmations - Tool calls waiting for approval
async fn list_confirmations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.confirmations.list_pending())
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationDecision {
    pub approved: bool,
}

/// POST /api/confirmations/{request_id} - Approve or deny a tool call
async fn resolve_confirmation(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(decision): Json<ConfirmationDecision>,
) -> Result<Json<Value>, ApiError> {
    if state.confirmations.resolve(&request_id, decision.approved) {
        Ok(Json(json!({"request_id": request_id, "approved": decision.approved})))
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("No pending confirmation: {}", request_id),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/events - Most recent logged events first
async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .event_log
        .recent(query.source_id.as_deref(), query.limit)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
