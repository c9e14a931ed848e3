use dashmap::DashMap;
use esox_connpool::{PoolConfiguration, ResourcePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const CALLERS: usize = 100;
const ITERATIONS: usize = 1000;

#[test]
fn concurrent_borrow_return_never_shares_or_double_closes() {
    let next_id = Arc::new(AtomicUsize::new(0));
    let closed: Arc<DashMap<usize, ()>> = Arc::new(DashMap::new());
    let double_closes = Arc::new(AtomicUsize::new(0));

    let factory_ids = Arc::clone(&next_id);
    let close_log = Arc::clone(&closed);
    let close_dupes = Arc::clone(&double_closes);

    let pool = ResourcePool::new(
        PoolConfiguration::new()
            .with_initial_size(5)
            .with_max_pool_size(10)
            .with_idle_timeout(Duration::from_secs(60))
            .with_factory(move || Ok(factory_ids.fetch_add(1, Ordering::SeqCst)))
            .with_close(move |id| {
                if close_log.insert(id, ()).is_some() {
                    close_dupes.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })
            .with_ping(|_| true),
    )
    .unwrap();

    let borrowed: Arc<DashMap<usize, ()>> = Arc::new(DashMap::new());
    let double_handouts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let pool = pool.clone();
            let borrowed = Arc::clone(&borrowed);
            let double_handouts = Arc::clone(&double_handouts);
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    let id = pool.get().unwrap();
                    if borrowed.insert(id, ()).is_some() {
                        double_handouts.fetch_add(1, Ordering::SeqCst);
                    }
                    borrowed.remove(&id);
                    pool.put(id).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(double_handouts.load(Ordering::SeqCst), 0);
    assert!(pool.len() <= pool.capacity());

    pool.release();

    assert_eq!(double_closes.load(Ordering::SeqCst), 0);
    // every resource ever created has been closed exactly once
    assert_eq!(closed.len(), next_id.load(Ordering::SeqCst));
}

#[test]
fn release_races_with_borrowers() {
    let created = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let (c, d) = (Arc::clone(&created), Arc::clone(&closed));

    let pool = ResourcePool::new(
        PoolConfiguration::new()
            .with_initial_size(4)
            .with_max_pool_size(8)
            .with_factory(move || Ok(c.fetch_add(1, Ordering::SeqCst)))
            .with_close(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    )
    .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                while let Ok(id) = pool.get() {
                    // a put after release closes the resource and reports Closed
                    if pool.put(id).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    pool.release();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.len(), 0);
    assert_eq!(closed.load(Ordering::SeqCst), created.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_callers_share_the_pool() {
    let pool = ResourcePool::new(
        PoolConfiguration::new()
            .with_initial_size(2)
            .with_max_pool_size(4)
            .with_factory(|| Ok(String::from("conn")))
            .with_close(|_| Ok(())),
    )
    .unwrap();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let conn = pool.get_async().await.unwrap();
                    assert_eq!(conn, "conn");
                    pool.put_async(conn).await.unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert!(pool.len() <= 4);
    assert!(pool.get_metrics().total_borrowed >= 640);
}

/// Counts every connection dropped without going through the close function
struct TrackedConn {
    closed: bool,
    leaked: Arc<AtomicUsize>,
}

impl Drop for TrackedConn {
    fn drop(&mut self) {
        if !self.closed {
            self.leaked.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_async_borrow_never_drops_unclosed_resource() {
    let leaked = Arc::new(AtomicUsize::new(0));
    let attempt = Arc::new(AtomicUsize::new(0));
    let (factory_leaks, factory_attempt) = (Arc::clone(&leaked), Arc::clone(&attempt));

    let pool = ResourcePool::new(
        PoolConfiguration::new()
            .with_max_pool_size(4)
            .with_operation_timeout(Duration::from_millis(1))
            .with_factory(move || {
                // land around the 1 ms deadline so the send races the timer
                let n = factory_attempt.fetch_add(1, Ordering::SeqCst) as u64;
                thread::sleep(Duration::from_micros(900 + (n % 5) * 50));
                Ok(TrackedConn {
                    closed: false,
                    leaked: Arc::clone(&factory_leaks),
                })
            })
            .with_close(|mut conn: TrackedConn| {
                conn.closed = true;
                Ok(())
            }),
    )
    .unwrap();

    let held = pool.get().unwrap();
    for _ in 0..1000 {
        if let Ok(conn) = pool.get_async().await {
            pool.destroy(conn).unwrap();
        }
    }

    // let straggling blocking borrows finish and hand their resources back
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.put(held).unwrap();
    pool.release();

    assert_eq!(leaked.load(Ordering::SeqCst), 0);
}
