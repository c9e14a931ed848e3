//! # EsoxSolutions.ConnPool
//!
//! Bounded, thread-safe pool for expensive-to-create resources such as
//! network connections.
//!
//! ## Features
//!
//! - Fixed-capacity FIFO idle buffer built on a lock-free queue
//! - Borrowing never blocks: an empty pool creates a new resource on demand
//! - Resources returned to a full pool are closed
//! - Lazy idle-timeout expiry, checked when a resource is borrowed
//! - Optional liveness probe on borrow and return
//! - Bounded factory retries
//! - RAII guards and async wrappers
//! - Metrics with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connpool::{PoolConfiguration, ResourcePool};
//!
//! let config = PoolConfiguration::new()
//!     .with_initial_size(2)
//!     .with_max_pool_size(8)
//!     .with_factory(|| Ok(String::from("connection")))
//!     .with_close(|_conn| Ok(()));
//!
//! let pool = ResourcePool::new(config).unwrap();
//! {
//!     let conn = pool.get_guarded().unwrap();
//!     println!("Got: {}", *conn);
//!     // Connection automatically returned when `conn` goes out of scope
//! }
//! assert_eq!(pool.len(), 2);
//! pool.release();
//! ```

mod pool;
mod config;
mod metrics;
mod eviction;
mod errors;

pub use pool::{Pool, PooledResource, ResourcePool};
pub use config::{CloseFn, FactoryFn, PingFn, PoolConfiguration};
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use errors::{BoxError, CallbackError, PoolError, PoolResult};
