//! Core connection pool implementation

use crate::config::{CloseFn, FactoryFn, PingFn, PoolConfiguration};
use crate::errors::{CallbackError, PoolError, PoolResult};
use crate::eviction::IdleEntry;
use crate::metrics::{MetricsTracker, PoolMetrics};

#[cfg(feature = "metrics")]
use crate::metrics::MetricsExporter;

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type IdleQueue<T> = Arc<ArrayQueue<IdleEntry<T>>>;

/// The operations a pool offers to its callers
pub trait Pool<T> {
    /// Borrow a resource, reusing an idle one or creating a new one
    fn get(&self) -> PoolResult<T>;

    /// Hand a borrowed resource back
    fn put(&self, resource: T) -> PoolResult<()>;

    /// Close a resource instead of returning it
    fn destroy(&self, resource: T) -> PoolResult<()>;

    /// Run the liveness probe against a resource
    fn is_alive(&self, resource: &T) -> bool;

    /// Close every idle resource and shut the pool down
    fn release(&self);

    /// Number of idle resources
    fn len(&self) -> usize;

    /// Whether no resource is idle
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Inner<T> {
    /// `None` once the pool has been released
    idle: Mutex<Option<IdleQueue<T>>>,
    factory: FactoryFn<T>,
    close: CloseFn<T>,
    ping: Option<PingFn<T>>,
    max_retries: usize,
    idle_timeout: Duration,
    operation_timeout: Duration,
    capacity: usize,
    metrics: MetricsTracker,
}

enum Enqueue<T> {
    Queued,
    Full(T),
    Closed(T),
}

/// A bounded pool of reusable resources such as network connections
///
/// Idle resources live in a fixed-capacity FIFO buffer. Borrowing never
/// waits: when the buffer is empty a new resource is created, so the number
/// of live resources may exceed the capacity while the buffer itself never
/// does. Resources returned to a full buffer are closed.
///
/// # Examples
///
/// ```
/// use esox_connpool::{PoolConfiguration, ResourcePool};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_initial_size(2)
///     .with_max_pool_size(4)
///     .with_factory(|| Ok(vec![0u8; 16]))
///     .with_close(|_buf| Ok(()))
///     .with_idle_timeout(Duration::from_secs(60));
///
/// let pool = ResourcePool::new(config).unwrap();
/// assert_eq!(pool.len(), 2);
///
/// let buf = pool.get().unwrap();
/// assert_eq!(pool.len(), 1);
///
/// pool.put(buf).unwrap();
/// assert_eq!(pool.len(), 2);
///
/// pool.release();
/// assert!(pool.get().is_err());
/// ```
pub struct ResourcePool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idle = self.inner.idle.lock().as_ref().map(|queue| queue.len());
        f.debug_struct("ResourcePool")
            .field("idle", &idle)
            .field("capacity", &self.inner.capacity)
            .field("max_retries", &self.inner.max_retries)
            .field("idle_timeout", &self.inner.idle_timeout)
            .finish()
    }
}

impl<T: Send + 'static> ResourcePool<T> {
    /// Validate the configuration and create `initial_size` resources
    ///
    /// If the factory fails while pre-populating, every resource created so
    /// far is closed and [`PoolError::Initialization`] is returned.
    pub fn new(config: PoolConfiguration<T>) -> PoolResult<Self> {
        config.validate()?;

        let PoolConfiguration {
            initial_size,
            max_pool_size,
            max_retries,
            idle_timeout,
            operation_timeout,
            factory,
            close,
            ping,
        } = config;
        let factory = factory.ok_or(PoolError::MissingFactory)?;
        let close = close.ok_or(PoolError::MissingClose)?;

        let idle = Arc::new(ArrayQueue::new(max_pool_size));
        let pool = Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(Some(Arc::clone(&idle))),
                factory,
                close,
                ping,
                max_retries,
                idle_timeout,
                operation_timeout,
                capacity: max_pool_size,
                metrics: MetricsTracker::new(),
            }),
        };

        for _ in 0..initial_size {
            let resource = match pool.create() {
                Ok(resource) => resource,
                Err(source) => {
                    pool.release();
                    return Err(PoolError::Initialization(source));
                }
            };
            if let Err(entry) = idle.push(IdleEntry::new(resource)) {
                pool.discard(entry.into_resource());
            }
        }

        debug!(
            initial_size,
            capacity = max_pool_size,
            max_retries,
            ?idle_timeout,
            "connection pool created"
        );
        Ok(pool)
    }

    /// Borrow a resource
    ///
    /// Idle resources are served oldest first. An idle resource that has
    /// outlived the idle timeout, or that fails the liveness probe, is closed
    /// and the next one is tried. With no idle resource left the factory is
    /// called; a failing factory is retried until `max_retries` is exceeded.
    pub fn get(&self) -> PoolResult<T> {
        let mut failures = 0;
        loop {
            let idle = self.idle_queue().ok_or(PoolError::Closed)?;

            if let Some(entry) = idle.pop() {
                if entry.is_expired(self.inner.idle_timeout) {
                    MetricsTracker::increment(&self.inner.metrics.idle_expirations);
                    debug!("closing resource that exceeded its idle timeout");
                    self.discard(entry.into_resource());
                    continue;
                }

                let resource = entry.into_resource();
                if !self.is_alive(&resource) {
                    MetricsTracker::increment(&self.inner.metrics.liveness_failures);
                    debug!("closing idle resource that failed the liveness check");
                    self.discard(resource);
                    continue;
                }

                MetricsTracker::increment(&self.inner.metrics.total_borrowed);
                return Ok(resource);
            }

            match self.create() {
                Ok(resource) => {
                    MetricsTracker::increment(&self.inner.metrics.total_borrowed);
                    return Ok(resource);
                }
                Err(source) => {
                    failures += 1;
                    if self.inner.max_retries != 0 && failures > self.inner.max_retries {
                        return Err(PoolError::RetriesExhausted {
                            attempts: failures,
                            source,
                        });
                    }
                }
            }
        }
    }

    /// Borrow a resource that returns itself to the pool when dropped
    pub fn get_guarded(&self) -> PoolResult<PooledResource<T>> {
        let resource = self.get()?;
        Ok(PooledResource::new(resource, self.clone()))
    }

    /// Return a borrowed resource
    ///
    /// The resource is closed instead of queued when it fails the liveness
    /// probe, when the pool has been released, or when the idle buffer is
    /// full. A failing close function is always reported.
    pub fn put(&self, resource: T) -> PoolResult<()> {
        if !self.is_alive(&resource) {
            MetricsTracker::increment(&self.inner.metrics.liveness_failures);
            debug!("closing returned resource that failed the liveness check");
            self.close_resource(resource)?;
            return Err(PoolError::NotAlive);
        }

        let outcome = {
            let idle = self.inner.idle.lock();
            match idle.as_ref() {
                None => Enqueue::Closed(resource),
                Some(queue) => match queue.push(IdleEntry::new(resource)) {
                    Ok(()) => Enqueue::Queued,
                    Err(entry) => Enqueue::Full(entry.into_resource()),
                },
            }
        };

        match outcome {
            Enqueue::Queued => {
                MetricsTracker::increment(&self.inner.metrics.total_returned);
                Ok(())
            }
            Enqueue::Full(resource) => {
                MetricsTracker::increment(&self.inner.metrics.discarded_full);
                debug!(
                    capacity = self.inner.capacity,
                    "idle buffer full, closing returned resource"
                );
                self.close_resource(resource)
            }
            Enqueue::Closed(resource) => {
                debug!("pool is closed, closing returned resource");
                self.close_resource(resource)?;
                Err(PoolError::Closed)
            }
        }
    }

    /// Close a single resource without returning it
    ///
    /// After the pool has been released the resource is still closed, and
    /// [`PoolError::Closed`] is reported unless closing failed.
    pub fn destroy(&self, resource: T) -> PoolResult<()> {
        let closed = self.is_closed();
        self.close_resource(resource)?;
        if closed {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Run the liveness probe; `true` when no probe is configured
    pub fn is_alive(&self, resource: &T) -> bool {
        self.inner.ping.as_ref().is_none_or(|ping| ping(resource))
    }

    /// Close every idle resource and shut the pool down
    ///
    /// Only the first call has an effect. Resources still borrowed are
    /// closed when they are returned.
    pub fn release(&self) {
        let Some(idle) = self.inner.idle.lock().take() else {
            return;
        };

        let mut drained = 0usize;
        while let Some(entry) = idle.pop() {
            self.discard(entry.into_resource());
            drained += 1;
        }
        debug!(drained, "connection pool released");
    }

    /// Number of idle resources; 0 after release
    pub fn len(&self) -> usize {
        self.idle_queue().map_or(0, |idle| idle.len())
    }

    /// Whether no resource is idle; also true after release
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the idle buffer
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Whether `release` has been called
    pub fn is_closed(&self) -> bool {
        self.inner.idle.lock().is_none()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(self.len(), self.inner.capacity)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    /// Borrow a resource from async code
    ///
    /// The borrow runs on the blocking thread pool and is bounded by the
    /// configured operation timeout. A resource that arrives after the
    /// timeout is returned to the pool.
    pub async fn get_async(&self) -> PoolResult<T> {
        let timeout = self.inner.operation_timeout;
        let pool = self.clone();
        let (tx, mut rx) = tokio::sync::oneshot::channel();

        tokio::task::spawn_blocking(move || {
            if let Err(Ok(resource)) = tx.send(pool.get()) {
                if let Err(e) = pool.put(resource) {
                    debug!(error = %e, "late resource was not returned to the pool");
                }
            }
        });

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PoolError::Cancelled),
            Err(_) => {
                // after close() a send either already landed here or fails on the sender side
                rx.close();
                if let Ok(Ok(resource)) = rx.try_recv()
                    && let Err(e) = self.put(resource)
                {
                    debug!(error = %e, "late resource was not returned to the pool");
                }
                Err(PoolError::Timeout(timeout))
            }
        }
    }

    /// Return a resource from async code
    pub async fn put_async(&self, resource: T) -> PoolResult<()> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.put(resource))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    fn idle_queue(&self) -> Option<IdleQueue<T>> {
        self.inner.idle.lock().clone()
    }

    fn create(&self) -> Result<T, CallbackError> {
        match (self.inner.factory)() {
            Ok(resource) => {
                MetricsTracker::increment(&self.inner.metrics.total_created);
                Ok(resource)
            }
            Err(e) => {
                MetricsTracker::increment(&self.inner.metrics.factory_failures);
                warn!(error = %e, "factory failed to create resource");
                Err(Arc::from(e))
            }
        }
    }

    fn close_resource(&self, resource: T) -> PoolResult<()> {
        MetricsTracker::increment(&self.inner.metrics.total_closed);
        (self.inner.close)(resource).map_err(|e| {
            MetricsTracker::increment(&self.inner.metrics.close_failures);
            PoolError::Close(Arc::from(e))
        })
    }

    /// Close a resource on a path with no caller to report to
    fn discard(&self, resource: T) {
        if let Err(e) = self.close_resource(resource) {
            warn!(error = %e, "failed to close discarded resource");
        }
    }
}

impl<T: Send + 'static> Pool<T> for ResourcePool<T> {
    fn get(&self) -> PoolResult<T> {
        ResourcePool::get(self)
    }

    fn put(&self, resource: T) -> PoolResult<()> {
        ResourcePool::put(self, resource)
    }

    fn destroy(&self, resource: T) -> PoolResult<()> {
        ResourcePool::destroy(self, resource)
    }

    fn is_alive(&self, resource: &T) -> bool {
        ResourcePool::is_alive(self, resource)
    }

    fn release(&self) {
        ResourcePool::release(self)
    }

    fn len(&self) -> usize {
        ResourcePool::len(self)
    }
}

/// A borrowed resource that returns itself to the pool when dropped
pub struct PooledResource<T: Send + 'static> {
    value: Option<T>,
    pool: ResourcePool<T>,
}

impl<T: Send + 'static> PooledResource<T> {
    fn new(value: T, pool: ResourcePool<T>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Take the resource out; it will no longer be returned to the pool
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("Value already taken")
    }

    /// Close the resource instead of returning it
    pub fn discard(mut self) -> PoolResult<()> {
        match self.value.take() {
            Some(value) => self.pool.destroy(value),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Deref for PooledResource<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T: Send + 'static> DerefMut for PooledResource<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T: Send + 'static> Drop for PooledResource<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take()
            && let Err(e) = self.pool.put(value)
        {
            debug!(error = %e, "pooled resource was closed instead of returned");
        }
    }
}
