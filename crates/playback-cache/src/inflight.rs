//! Per-key in-flight guards for collapsing concurrent cache misses
//!
//! Without a registry, N concurrent misses for one key run the query N times
//! and overwrite each other's entry. With one, the first caller holds the
//! key's guard while it computes; the others wait on the same guard and then
//! re-check the cache. Failures are never shared: if the leader errors,
//! nothing is cached and each follower runs the query itself.

use crate::key::CacheKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    locks: DashMap<CacheKey, Arc<Mutex<()>>, ahash::RandomState>,
}

/// Held while a query for `key` is running. Dropping it wakes the next waiter
/// and removes the key's lock once nobody else references it.
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    key: CacheKey,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller is computing `key`, then claim it
    pub async fn acquire(&self, key: &CacheKey) -> InFlightGuard<'_> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = Arc::clone(&lock).lock_owned().await;

        InFlightGuard {
            registry: self,
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of keys with a query running or waiting
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // one reference in the map plus ours means no waiters remain; the
        // shard lock held by remove_if keeps new callers from cloning meanwhile
        self.registry
            .locks
            .remove_if(&self.key, |_, lock| {
                Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
            });
    }
}
