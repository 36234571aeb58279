// src/common/error.rs

//! Error types for the connection pool.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// No admission permit became available within the timeout.
    #[error("Connection pool exhausted: no connection available within {timeout:?}")]
    PoolExhausted {
        /// How long the caller waited.
        timeout: Duration,
    },

    /// The factory could not create a backend connection.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The pool has been shut down.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Pool configuration rejected at construction.
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Settings file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PoolError {
    /// Returns true if the caller may retry (with backoff) or surface a
    /// transient failure upstream.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. } | PoolError::BackendUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PoolError::PoolExhausted { timeout: Duration::from_millis(5) }.is_retryable());
        assert!(PoolError::BackendUnavailable("refused".to_string()).is_retryable());
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(!PoolError::InvalidConfig("max_total".to_string()).is_retryable());
    }

    #[test]
    fn test_exhausted_message_includes_timeout() {
        let err = PoolError::PoolExhausted { timeout: Duration::from_millis(250) };
        assert!(err.to_string().contains("250ms"));
    }
}
