//! Error types for adrater-core

use thiserror::Error;

/// Errors that can occur while talking to the analysis service
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection or protocol failure reported by the HTTP stack
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-2xx status
    #[error("HTTP error! status: {status} ({detail})")]
    Status { status: u16, detail: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// The request violates a client-side invariant
    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    /// `start` was called on a controller that is not idle
    #[error("session cannot start while {state}")]
    SessionUnavailable { state: &'static str },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

/// Result type for adrater-core operations.
pub type Result<T> = std::result::Result<T, ClientError>;
