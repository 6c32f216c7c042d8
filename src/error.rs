//! Error types for the execution engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum QueryError {
    /// Structural contract violation: wrong child arity, illegal expression
    /// kind in a position, column index out of range.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl QueryError {
    /// True for errors that indicate a malformed plan rather than bad data
    pub fn is_invalid_plan(&self) -> bool {
        matches!(self, QueryError::InvalidPlan(_))
    }
}
