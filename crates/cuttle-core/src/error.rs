//! Error types for cuttle

use std::time::Duration;

use thiserror::Error;

/// Core error type for pool and driver operations
#[derive(Error, Debug)]
pub enum CuttleError {
    /// No connection could be checked out before the acquire timeout elapsed
    #[error("Pool exhausted: no connection available within {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// A driver operation was attempted through a connection already returned to its pool
    #[error("Connection has already been returned to the pool")]
    UseAfterClose,

    /// A convenience operation needed a bound connection and there was none
    #[error("There's no connection bound to the current unit of work")]
    NoActiveConnection,

    /// A pool was requested for a host context the configuration is not attached to
    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl CuttleError {
    /// Whether this error reports a lost or unusable backend connection.
    ///
    /// Drivers return `Connection` errors for broken sockets; callers can use
    /// this to decide whether to invalidate the connection they were using.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, CuttleError::Connection(_) | CuttleError::Timeout(_))
    }
}

/// Result type alias for cuttle operations
pub type Result<T> = std::result::Result<T, CuttleError>;
