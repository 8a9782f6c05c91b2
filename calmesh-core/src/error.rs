//! Error types for the calmesh ecosystem.

use thiserror::Error;

/// Errors that can occur in calmesh operations.
#[derive(Error, Debug)]
pub enum CalMeshError {
    #[error("Calendar access denied")]
    AuthorizationDenied,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for calmesh operations.
pub type CalMeshResult<T> = Result<T, CalMeshError>;
