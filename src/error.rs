//! Error types for the document client.

use thiserror::Error;

/// Main error type for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The gate or client was configured with unusable settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The document is missing a required field or uses an unsupported value
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The caller's wait for admission was interrupted
    #[error("Admission wait was cancelled")]
    Cancelled,

    /// The remote service refused the document
    #[error("API request failed with status code: {status}, Error message: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        description: Option<String>,
    },

    /// Connection, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the expected JSON document
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
