//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "metrics")]
use serde::{Deserialize, Serialize};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_connpool::{PoolConfiguration, ResourcePool};
///
/// let config = PoolConfiguration::new()
///     .with_initial_size(3)
///     .with_max_pool_size(10)
///     .with_factory(|| Ok(String::from("conn")))
///     .with_close(|_| Ok(()));
/// let pool = ResourcePool::new(config).unwrap();
///
/// let conn = pool.get().unwrap();
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_created, 3);
/// assert_eq!(metrics.total_borrowed, 1);
/// assert_eq!(metrics.idle_resources, 2);
/// pool.put(conn).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "metrics", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Resources produced by the factory
    pub total_created: usize,

    /// Resources handed to the close function
    pub total_closed: usize,

    /// Successful `get` calls
    pub total_borrowed: usize,

    /// Resources accepted back into the idle buffer
    pub total_returned: usize,

    /// Idle resources closed because their idle timeout elapsed
    pub idle_expirations: usize,

    /// Resources closed after failing the liveness probe
    pub liveness_failures: usize,

    /// Factory calls that returned an error
    pub factory_failures: usize,

    /// Returned resources closed because the idle buffer was full
    pub discarded_full: usize,

    /// Close calls that returned an error
    pub close_failures: usize,

    /// Current idle resources
    pub idle_resources: usize,

    /// Idle buffer capacity
    pub max_capacity: usize,

    /// Idle buffer fill ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("idle_expirations".to_string(), self.idle_expirations.to_string());
        metrics.insert("liveness_failures".to_string(), self.liveness_failures.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("discarded_full".to_string(), self.discarded_full.to_string());
        metrics.insert("close_failures".to_string(), self.close_failures.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let metrics = PoolMetrics { idle_resources: 4, max_capacity: 8, ..Default::default() };
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&metrics, "nats", Some(&tags)).unwrap();
    /// assert!(output.contains("connpool_resources_idle"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        let idle = IntGauge::with_opts(opts("connpool_resources_idle", "Current idle resources"))?;
        idle.set(metrics.idle_resources as i64);
        registry.register(Box::new(idle))?;

        let capacity = IntGauge::with_opts(opts("connpool_capacity", "Idle buffer capacity"))?;
        capacity.set(metrics.max_capacity as i64);
        registry.register(Box::new(capacity))?;

        let utilization = Gauge::with_opts(opts("connpool_utilization", "Idle buffer fill ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("connpool_resources_created_total", "Resources created", metrics.total_created),
            ("connpool_resources_closed_total", "Resources closed", metrics.total_closed),
            ("connpool_resources_borrowed_total", "Resources borrowed", metrics.total_borrowed),
            ("connpool_resources_returned_total", "Resources returned", metrics.total_returned),
            (
                "connpool_idle_expirations_total",
                "Idle timeout expirations",
                metrics.idle_expirations,
            ),
            (
                "connpool_liveness_failures_total",
                "Liveness check failures",
                metrics.liveness_failures,
            ),
            ("connpool_factory_failures_total", "Factory failures", metrics.factory_failures),
            (
                "connpool_discarded_full_total",
                "Resources discarded on a full pool",
                metrics.discarded_full,
            ),
            ("connpool_close_failures_total", "Close failures", metrics.close_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_created: AtomicUsize,
    pub total_closed: AtomicUsize,
    pub total_borrowed: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub idle_expirations: AtomicUsize,
    pub liveness_failures: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub discarded_full: AtomicUsize,
    pub close_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, idle: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            idle as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            idle_expirations: self.idle_expirations.load(Ordering::Relaxed),
            liveness_failures: self.liveness_failures.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            discarded_full: self.discarded_full.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            idle_resources: idle,
            max_capacity: capacity,
            utilization,
        }
    }
}
