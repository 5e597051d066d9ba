use thiserror::Error;

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by event sources
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_id}' is not running")]
    NotRunning { source_id: String },

    #[error("source '{source_id}' is already running")]
    AlreadyRunning { source_id: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected message: {0}")]
    Protocol(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
