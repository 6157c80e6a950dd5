//! Error types for newsquery
//!
//! One taxonomy shared by every component. Recoverable retrieval errors are
//! absorbed by the pipeline and turned into degradation flags; only total
//! failures and configuration faults reach the caller.

use thiserror::Error;

/// Main error type for the query service
///
/// `Clone` so a single failed computation can be handed to every waiter of a
/// single-flight cache slot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Bad query text or filters supplied by the caller
    #[error("Invalid query: {0}")]
    InputError(String),

    /// Embedding model missing or corrupt
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// Embedding inference did not finish in time
    #[error("Embedding inference timed out after {duration_ms}ms")]
    InferenceTimeout { duration_ms: u64 },

    /// The index backend could not be reached or failed server-side
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The index backend answered with a client error (4xx)
    #[error("Index rejected request with status {status}: {body}")]
    IndexRejected { status: u16, body: String },

    /// Query vector and index vector field disagree on dimension
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Both retrieval paths failed for one query
    #[error("No retrieval source available: {0}")]
    NoRetrievalAvailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },
}

/// Coarse classification of an error for the service entrypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller's fault, do not retry
    Client,
    /// Service-side failure
    Service,
}

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Transient errors worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::IndexUnavailable(_)
                | QueryError::InferenceTimeout { .. }
                | QueryError::Timeout { .. }
        )
    }

    /// Configuration faults that must never be degraded around
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QueryError::ModelUnavailable(_)
                | QueryError::DimensionMismatch { .. }
                | QueryError::ConfigError(_)
        )
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            QueryError::InputError(_) => ErrorClass::Client,
            _ => ErrorClass::Service,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        QueryError::IndexUnavailable(err.to_string())
    }
}

impl From<candle_core::Error> for QueryError {
    fn from(err: candle_core::Error) -> Self {
        QueryError::ModelUnavailable(err.to_string())
    }
}
