//! Error types for the client

use fluxgate_core::CoreError;
use thiserror::Error;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Wildcard column selection is not supported for scoped reads")]
    WildcardNotSupported,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("No Tokio runtime is running; create the client inside one")]
    NoRuntime,

    #[error("Batch writer has shut down")]
    BatchClosed,
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
