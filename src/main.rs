// EsoxSolutions.ConnPool
// Demo driver: many tasks publishing through pooled (simulated) connections

use esox_connpool::{Pool, PoolConfiguration, PoolResult, ResourcePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

const SUBJECTS: [&str; 3] = ["subject_1", "subject_2", "subject_3"];
const MESSAGES: usize = 1000;

/// Stand-in for a messaging client connection
struct Connection {
    id: usize,
    connected: AtomicBool,
    published: AtomicUsize,
}

impl Connection {
    fn connect(id: usize) -> Self {
        Self {
            id,
            connected: AtomicBool::new(true),
            published: AtomicUsize::new(0),
        }
    }

    fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), String> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(format!("connection {} is closed", self.id));
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(conn = self.id, subject, bytes = payload.len(), "published");
        Ok(())
    }

    fn drain(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

fn publish(pool: &dyn Pool<Connection>, subject: &str, payload: &[u8]) -> PoolResult<()> {
    let conn = pool.get()?;
    if let Err(e) = conn.publish(subject, payload) {
        error!(error = %e, "publish failed");
    }
    pool.put(conn)?;
    debug!(idle = pool.len(), "published to {subject}");
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== EsoxSolutions.ConnPool ===");

    let next_id = Arc::new(AtomicUsize::new(0));
    let config = PoolConfiguration::new()
        .with_initial_size(10)
        .with_max_pool_size(100)
        .with_max_retries(3)
        .with_idle_timeout(Duration::from_secs(600))
        .with_factory(move || Ok(Connection::connect(next_id.fetch_add(1, Ordering::Relaxed))))
        .with_close(|conn: Connection| {
            conn.drain();
            Ok(())
        })
        .with_ping(|conn: &Connection| conn.connected.load(Ordering::Relaxed));

    let pool = match ResourcePool::new(config) {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to build pool");
            return;
        }
    };
    println!("Idle connections after start: {}", pool.len());

    let mut tasks = Vec::with_capacity(MESSAGES * SUBJECTS.len());
    for count in 1..=MESSAGES {
        for subject in SUBJECTS {
            let pool = pool.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                let payload = format!("Hello World--{count}");
                publish(&pool, subject, payload.as_bytes())
            }));
        }
    }

    let mut failed = 0;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "publish task failed");
                failed += 1;
            }
            Err(e) => {
                error!(error = %e, "publish task panicked");
                failed += 1;
            }
        }
    }

    let metrics = pool.get_metrics();
    println!("Failed publishes: {failed}");
    println!("Connections created: {}", metrics.total_created);
    println!("Idle connections: {}", pool.len());

    pool.release();
    println!("Idle connections after release: {}", pool.len());
}
