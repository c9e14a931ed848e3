//! Idle-timeout bookkeeping for pooled resources

use std::time::{Duration, Instant};

/// A resource waiting in the idle buffer, stamped with the moment it was stored
#[derive(Debug)]
pub(crate) struct IdleEntry<T> {
    resource: T,
    idle_since: Instant,
}

impl<T> IdleEntry<T> {
    pub fn new(resource: T) -> Self {
        Self {
            resource,
            idle_since: Instant::now(),
        }
    }

    /// Expired once `idle_since + timeout` has been reached
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.is_expired_at(Instant::now(), timeout)
    }

    pub fn is_expired_at(&self, now: Instant, timeout: Duration) -> bool {
        match self.idle_since.checked_add(timeout) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    pub fn into_resource(self) -> T {
        self.resource
    }
}
