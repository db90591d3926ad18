//! Error types for backend access

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for StoreError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        StoreError::WebSocket(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
