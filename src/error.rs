//! Error types for Engram

use thiserror::Error;

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;

/// Main error type for Engram
#[derive(Error, Debug)]
pub enum EngramError {
    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for EngramError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                EngramError::Integrity(err.to_string())
            }
            _ => EngramError::Database(err),
        }
    }
}

impl EngramError {
    /// Get error code for the MCP protocol
    pub fn code(&self) -> i64 {
        match self {
            EngramError::NotFound(_) => -32001,
            EngramError::InvalidInput(_) => -32602,
            EngramError::Integrity(_) => -32005,
            _ => -32000,
        }
    }
}
