//! Cache invalidation support
//!
//! Whole-cache invalidation driven by dataset-wide events. A completed sync can
//! touch any row, so every cached result is dropped rather than tracking which
//! keys depend on which rows.

use crate::cache::QueryCache;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Trait for components that can drop cached results
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate all cache entries, returning how many were dropped
    fn invalidate_all(&self) -> usize;

    /// Check if the invalidator is enabled
    fn is_enabled(&self) -> bool;
}

impl CacheInvalidator for QueryCache {
    fn invalidate_all(&self) -> usize {
        self.clear()
    }

    fn is_enabled(&self) -> bool {
        QueryCache::is_enabled(self)
    }
}

/// A simple no-op invalidator that does nothing
#[derive(Debug, Default, Clone)]
pub struct NoOpInvalidator;

impl CacheInvalidator for NoOpInvalidator {
    fn invalidate_all(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Events that can trigger cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// A background sync finished writing new playback records
    SyncCompleted {
        records_added: u64,
        total_records: u64,
    },
    /// An operator asked for the cache to be emptied
    ManualClear,
}

impl InvalidationEvent {
    pub fn sync_completed(records_added: u64, total_records: u64) -> Self {
        Self::SyncCompleted {
            records_added,
            total_records,
        }
    }
}

/// Something that wants to hear about completed syncs after the cache has
/// been cleared, e.g. a broadcaster pushing fresh stats to dashboards
pub trait SyncObserver: Send + Sync {
    fn on_sync_completed(&self, records_added: u64, total_records: u64);
}

/// Clears the shared cache when the dataset changes wholesale
#[derive(Default, Clone)]
pub struct SyncInvalidationHook {
    cache: Option<Arc<dyn CacheInvalidator>>,
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl SyncInvalidationHook {
    pub fn new(cache: Option<Arc<QueryCache>>) -> Self {
        Self {
            cache: cache.map(|c| c as Arc<dyn CacheInvalidator>),
            observers: Vec::new(),
        }
    }

    /// Use any invalidator in place of a [`QueryCache`]
    pub fn with_invalidator(invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            cache: Some(invalidator),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sync completion callback: clear the cache if there is one, then notify
    /// observers so they read post-sync data
    pub fn on_sync_completed(&self, records_added: u64, total_records: u64) {
        let dropped = self.clear_cache();
        tracing::info!(
            records_added,
            total_records,
            dropped,
            "Sync completed, cache cleared"
        );

        for observer in &self.observers {
            observer.on_sync_completed(records_added, total_records);
        }
    }

    /// Apply a single event
    pub fn handle(&self, event: &InvalidationEvent) {
        match *event {
            InvalidationEvent::SyncCompleted {
                records_added,
                total_records,
            } => self.on_sync_completed(records_added, total_records),
            InvalidationEvent::ManualClear => {
                let dropped = self.clear_cache();
                tracing::info!(dropped, "Cache cleared on request");
            }
        }
    }

    /// Apply events from `rx` until the channel closes or `cancel` fires
    pub async fn run(self, mut rx: mpsc::Receiver<InvalidationEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle(&event),
                    None => break,
                },
            }
        }
        tracing::debug!("Invalidation listener stopped");
    }

    fn clear_cache(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.invalidate_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<(u64, u64)>>,
    }

    impl SyncObserver for RecordingObserver {
        fn on_sync_completed(&self, records_added: u64, total_records: u64) {
            self.calls.lock().push((records_added, total_records));
        }
    }

    fn filled_cache() -> Arc<QueryCache> {
        let cache = Arc::new(QueryCache::with_defaults());
        cache.put(CacheKey::from_raw("k1"), json!("v1"));
        cache.put(CacheKey::from_raw("k2"), json!("v2"));
        cache
    }

    #[test]
    fn test_sync_completed_clears_cache_and_notifies() {
        let cache = filled_cache();
        let observer = Arc::new(RecordingObserver::default());
        let hook = SyncInvalidationHook::new(Some(cache.clone())).with_observer(observer.clone());

        hook.on_sync_completed(100, 500);

        assert!(cache.get(&CacheKey::from_raw("k1")).is_none());
        assert!(cache.get(&CacheKey::from_raw("k2")).is_none());
        assert_eq!(*observer.calls.lock(), vec![(100, 500)]);
    }

    #[test]
    fn test_tolerates_missing_cache_and_observers() {
        let hook = SyncInvalidationHook::new(None);
        hook.on_sync_completed(10, 100);
        hook.handle(&InvalidationEvent::ManualClear);
    }

    #[test]
    fn test_concurrent_sync_callbacks() {
        let cache = filled_cache();
        let hook = SyncInvalidationHook::new(Some(cache.clone()));

        std::thread::scope(|s| {
            for n in 0..16 {
                let hook = &hook;
                let cache = &cache;
                s.spawn(move || {
                    cache.put(CacheKey::from_raw(format!("t{}", n)), json!(n));
                    hook.on_sync_completed(n, n * 100);
                });
            }
        });

        assert_eq!(cache.stats().clears(), 16);
    }

    #[test]
    fn test_noop_invalidator() {
        let invalidator = NoOpInvalidator;
        assert_eq!(invalidator.invalidate_all(), 0);
        assert!(!invalidator.is_enabled());

        let hook = SyncInvalidationHook::with_invalidator(Arc::new(NoOpInvalidator));
        hook.on_sync_completed(1, 1);
    }

    #[tokio::test]
    async fn test_listener_applies_events_until_closed() {
        let cache = filled_cache();
        let hook = SyncInvalidationHook::new(Some(cache.clone()));
        let (tx, rx) = mpsc::channel(4);
        let listener = tokio::spawn(hook.run(rx, CancellationToken::new()));

        tx.send(InvalidationEvent::sync_completed(5, 50)).await.unwrap();
        drop(tx);
        listener.await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().clears(), 1);
    }

    #[tokio::test]
    async fn test_listener_stops_on_cancel() {
        let hook = SyncInvalidationHook::new(None);
        let (_tx, rx) = mpsc::channel::<InvalidationEvent>(1);
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(hook.run(rx, cancel.clone()));

        cancel.cancel();
        listener.await.unwrap();
    }
}
