//! Error types for the connection pool

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error produced by a caller-supplied factory or close callback
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of a callback error, kept cloneable inside [`PoolError`]
pub type CallbackError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("invalid capacity settings: initial size {initial}, max pool size {max}")]
    InvalidCapacity { initial: usize, max: usize },

    #[error("invalid factory settings - a factory function is required")]
    MissingFactory,

    #[error("invalid close settings - a close function is required")]
    MissingClose,

    #[error("invalid idle timeout - must be greater than zero")]
    InvalidIdleTimeout,

    #[error("factory failed to initialize the pool: {0}")]
    Initialization(#[source] CallbackError),

    #[error("pool is closed")]
    Closed,

    #[error("factory retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: CallbackError,
    },

    #[error("resource failed the liveness check and was closed")]
    NotAlive,

    #[error("closing resource failed: {0}")]
    Close(#[source] CallbackError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,
}

impl PoolError {
    /// Whether this error was raised while validating a configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidCapacity { .. }
                | PoolError::MissingFactory
                | PoolError::MissingClose
                | PoolError::InvalidIdleTimeout
        )
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_retries_exhausted_keeps_source() {
        let cause: BoxError = "connection refused".into();
        let err = PoolError::RetriesExhausted {
            attempts: 4,
            source: Arc::from(cause),
        };

        assert!(err.to_string().contains("4 attempts"));
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(PoolError::MissingFactory.is_configuration());
        assert!(PoolError::InvalidCapacity { initial: 2, max: 1 }.is_configuration());
        assert!(!PoolError::Closed.is_configuration());
    }
}
