//! Pool configuration options

use crate::errors::{BoxError, PoolError, PoolResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Creates one resource
pub type FactoryFn<T> = Arc<dyn Fn() -> Result<T, BoxError> + Send + Sync>;

/// Closes (destroys) one resource
pub type CloseFn<T> = Arc<dyn Fn(T) -> Result<(), BoxError> + Send + Sync>;

/// Reports whether a resource is still usable
pub type PingFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<u32>::new()
///     .with_initial_size(5)
///     .with_max_pool_size(50)
///     .with_factory(|| Ok(7))
///     .with_close(|_| Ok(()))
///     .with_idle_timeout(Duration::from_secs(600));
///
/// assert_eq!(config.max_pool_size, 50);
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfiguration<T> {
    /// Number of resources created eagerly when the pool is built
    pub initial_size: usize,

    /// Capacity of the idle buffer
    pub max_pool_size: usize,

    /// Retries allowed for a failing factory inside one `get`; 0 = unlimited
    pub max_retries: usize,

    /// Resources idle longer than this are closed on the next `get`
    pub idle_timeout: Duration,

    /// Upper bound for `get_async`
    pub operation_timeout: Duration,

    pub factory: Option<FactoryFn<T>>,

    pub close: Option<CloseFn<T>>,

    /// Optional liveness probe; when absent liveness checks are skipped
    pub ping: Option<PingFn<T>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            initial_size: 1,
            max_pool_size: 100,
            max_retries: 0,
            idle_timeout: Duration::from_secs(600),
            operation_timeout: Duration::from_secs(30),
            factory: None,
            close: None,
            ping: None,
        }
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            initial_size: self.initial_size,
            max_pool_size: self.max_pool_size,
            max_retries: self.max_retries,
            idle_timeout: self.idle_timeout,
            operation_timeout: self.operation_timeout,
            factory: self.factory.clone(),
            close: self.close.clone(),
            ping: self.ping.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("initial_size", &self.initial_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("max_retries", &self.max_retries)
            .field("idle_timeout", &self.idle_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("factory", &self.factory.is_some())
            .field("close", &self.close.is_some())
            .field("ping", &self.ping.is_some())
            .finish()
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of resources created up front
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::<i32>::new()
    ///     .with_max_pool_size(50);
    ///
    /// assert_eq!(config.max_pool_size, 50);
    /// ```
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the factory retry limit (0 = unlimited)
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set idle timeout for resources
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set operation timeout
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the function that creates resources
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set the function that closes resources
    pub fn with_close<F>(mut self, close: F) -> Self
    where
        F: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.close = Some(Arc::new(close));
        self
    }

    /// Set the liveness probe
    pub fn with_ping<F>(mut self, ping: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.ping = Some(Arc::new(ping));
        self
    }

    /// Check the configuration before a pool is built from it
    pub fn validate(&self) -> PoolResult<()> {
        if self.initial_size == 0
            || self.max_pool_size == 0
            || self.initial_size > self.max_pool_size
        {
            return Err(PoolError::InvalidCapacity {
                initial: self.initial_size,
                max: self.max_pool_size,
            });
        }
        if self.factory.is_none() {
            return Err(PoolError::MissingFactory);
        }
        if self.close.is_none() {
            return Err(PoolError::MissingClose);
        }
        if self.idle_timeout.is_zero() {
            return Err(PoolError::InvalidIdleTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> PoolConfiguration<u8> {
        PoolConfiguration::new()
            .with_factory(|| Ok(1))
            .with_close(|_| Ok(()))
    }

    #[test]
    fn test_defaults_validate() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_invalid_capacity() {
        let err = complete()
            .with_initial_size(5)
            .with_max_pool_size(2)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidCapacity { initial: 5, max: 2 }));

        let err = complete().with_initial_size(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidCapacity { .. }));

        let err = complete().with_max_pool_size(0).validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidCapacity { .. }));
    }

    #[test]
    fn test_missing_callbacks() {
        let err = PoolConfiguration::<u8>::new()
            .with_close(|_| Ok(()))
            .validate()
            .unwrap_err();
        assert!(matches!(err, PoolError::MissingFactory));

        let err = PoolConfiguration::<u8>::new()
            .with_factory(|| Ok(1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, PoolError::MissingClose));
    }

    #[test]
    fn test_zero_idle_timeout() {
        let err = complete()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidIdleTimeout));
    }

    #[test]
    fn test_debug_hides_callbacks() {
        let rendered = format!("{:?}", complete().with_ping(|_| true));
        assert!(rendered.contains("ping: true"));
        assert!(rendered.contains("max_pool_size: 100"));
    }
}
