//! Error types for fluxgate-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty measurement name")]
    EmptyMeasurement,

    #[error("Empty tag key")]
    EmptyTagKey,

    #[error("Empty field key")]
    EmptyFieldKey,

    #[error("No fields provided")]
    NoFields,

    #[error("{kind} {name:?} cannot be written as line protocol")]
    UnencodableName { kind: &'static str, name: String },

    #[error("Non-finite float in field '{0}'")]
    NonFiniteField(String),

    #[error("Line protocol parse error: {0}")]
    Parse(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}
