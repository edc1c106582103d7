//! Backend error types.

use thiserror::Error;

/// Errors raised at the search engine boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Index creation refused because the name is taken
    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    /// Referenced index does not exist
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// The server-side scroll context is gone
    #[error("Scroll context expired: {0}")]
    ScrollExpired(String),

    /// Connection, timeout or other transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine answered, but not with something we can use
    #[error("Engine error (status {status}): {message}")]
    Engine { status: u16, message: String },

    /// Malformed response body
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Request the backend cannot express
    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Serialization(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}
