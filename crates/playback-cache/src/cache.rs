//! TTL query result cache implementation

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::key::CacheKey;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared handle to a cached query result
pub type CachedValue = Arc<Value>;

/// Entry stored in the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached query result
    pub value: CachedValue,
    /// When this entry was created
    pub created_at: Instant,
    /// First instant at which this entry is no longer served
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(value: CachedValue, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if this entry has expired at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

}

type EntryMap = HashMap<CacheKey, CacheEntry, ahash::RandomState>;

/// Thread-safe TTL cache for query results.
///
/// One instance is created per server process and shared by reference; every
/// method takes `&self` and synchronizes internally.
pub struct QueryCache {
    /// The underlying entry map
    entries: RwLock<EntryMap>,
    /// Cache configuration
    config: CacheConfig,
    /// Cache statistics
    stats: Arc<CacheStats>,
    clock: Arc<dyn Clock>,
}

impl QueryCache {
    /// Create a new query cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Create a cache that reads time from `clock`
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(EntryMap::default()),
            config,
            stats: Arc::new(CacheStats::new()),
            clock,
        }
    }

    /// Check if caching is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get an entry from the cache. Expired entries read as absent and are
    /// removed on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let hit = self.lookup(key);
        if hit.is_none() && self.config.enabled {
            self.stats.record_miss();
        }
        hit
    }

    /// Like [`get`](Self::get), but a miss is not counted. For callers that
    /// follow a miss with a counted `get` for the same request.
    pub fn get_if_present(&self, key: &CacheKey) -> Option<CachedValue> {
        self.lookup(key)
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        if !self.config.enabled {
            return None;
        }

        let now = self.clock.now();
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.stats.record_hit();
                    return Some(Arc::clone(&entry.value));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write();
            // a concurrent put may have replaced the entry since the read lock was dropped
            if entries.get(key).is_some_and(|e| e.is_expired(now)) {
                entries.remove(key);
                self.stats.record_expirations(1);
                self.stats.set_entry_count(entries.len() as u64);
            }
        }

        None
    }

    /// Insert an entry into the cache, replacing any existing entry for the key
    pub fn put(&self, key: CacheKey, value: Value) {
        self.put_shared(key, Arc::new(value));
    }

    /// Insert a value the caller keeps a handle to
    pub fn put_shared(&self, key: CacheKey, value: CachedValue) {
        if !self.config.enabled {
            return;
        }

        let entry = CacheEntry::new(value, self.clock.now(), self.config.ttl);
        let entry_count = {
            let mut entries = self.entries.write();
            entries.insert(key, entry);
            entries.len() as u64
        };

        self.stats.record_insertion();
        self.stats.set_entry_count(entry_count);
    }

    /// Remove an entry from the cache
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let (removed, entry_count) = {
            let mut entries = self.entries.write();
            let removed = entries.remove(key).is_some();
            (removed, entries.len() as u64)
        };

        if removed {
            self.stats.record_invalidation();
            self.stats.set_entry_count(entry_count);
        }
        removed
    }

    /// Clear all entries from the cache, returning how many were dropped
    pub fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write();
            let removed = entries.len();
            entries.clear();
            removed
        };

        self.stats.record_clear();
        self.stats.set_entry_count(0);
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get a serializable copy of the current statistics
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        self.stats.set_entry_count(self.len() as u64);
        self.stats.snapshot()
    }

    /// Get current number of entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Expire entries that have exceeded TTL
    pub fn expire_stale(&self) -> usize {
        let now = self.clock.now();
        let (expired, entry_count) = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            (before - entries.len(), entries.len() as u64)
        };

        if expired > 0 {
            self.stats.record_expirations(expired as u64);
        }
        self.stats.set_entry_count(entry_count);
        expired
    }

    /// Periodically purge expired entries until `cancel` fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = cache.expire_stale();
                        if expired > 0 {
                            tracing::debug!("Swept {} expired cache entries", expired);
                        }
                    }
                }
            }
            tracing::debug!("Cache sweeper stopped");
        })
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("enabled", &self.config.enabled)
            .field("ttl", &self.config.ttl)
            .field("current_entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::thread;

    fn key(name: &str) -> CacheKey {
        CacheKey::from_raw(name)
    }

    fn manual_cache(ttl: Duration) -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = QueryCache::with_clock(CacheConfig::default().with_ttl(ttl), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_cache_put_get() {
        let cache = QueryCache::with_defaults();
        cache.put(key("k1"), json!([{"lat": 40.7, "lon": -74.0}]));

        let result = cache.get(&key("k1")).unwrap();
        assert_eq!(*result, json!([{"lat": 40.7, "lon": -74.0}]));
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = QueryCache::with_defaults();

        assert!(cache.get(&key("missing")).is_none());
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_get_if_present_counts_hits_only() {
        let (cache, clock) = manual_cache(Duration::from_secs(10));

        assert!(cache.get_if_present(&key("k1")).is_none());
        assert_eq!(cache.stats().total_requests(), 0);

        cache.put(key("k1"), json!(1));
        assert!(cache.get_if_present(&key("k1")).is_some());
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 0);

        clock.advance(Duration::from_secs(10));
        assert!(cache.get_if_present(&key("k1")).is_none());
        assert_eq!(cache.stats().expirations(), 1);
        assert_eq!(cache.stats().misses(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = QueryCache::with_defaults();
        cache.put(key("k1"), json!(1));
        cache.put(key("k1"), json!(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(&key("k1")).unwrap(), json!(2));
    }

    #[test]
    fn test_cache_ttl_expiration() {
        let (cache, clock) = manual_cache(Duration::from_secs(60));
        cache.put(key("k1"), json!("v1"));

        clock.advance(Duration::from_secs(59));
        assert!(cache.get(&key("k1")).is_some());

        // expiry is inclusive: now == expires_at is already expired
        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key("k1")).is_none());
        assert_eq!(cache.stats().expirations(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_ttl_never_serves() {
        let cache = QueryCache::new(CacheConfig::default().with_ttl(Duration::ZERO));
        cache.put(key("k1"), json!("v1"));
        assert!(cache.get(&key("k1")).is_none());
    }

    #[test]
    fn test_wall_clock_expiration() {
        let cache = QueryCache::new(CacheConfig::default().with_ttl(Duration::from_millis(50)));
        cache.put(key("k1"), json!("v1"));
        assert!(cache.get(&key("k1")).is_some());

        thread::sleep(Duration::from_millis(100));

        assert!(cache.get(&key("k1")).is_none());
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = QueryCache::with_defaults();
        cache.put(key("k1"), json!(1));

        assert!(cache.invalidate(&key("k1")));
        assert!(!cache.invalidate(&key("k1")));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().invalidations(), 1);
    }

    #[test]
    fn test_cache_clear() {
        let cache = QueryCache::with_defaults();
        cache.put(key("k1"), json!("v1"));
        cache.put(key("k2"), json!("v2"));

        assert_eq!(cache.clear(), 2);
        assert!(cache.get(&key("k1")).is_none());
        assert!(cache.get(&key("k2")).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().clears(), 1);
    }

    #[test]
    fn test_cache_disabled() {
        let cache = QueryCache::new(CacheConfig::disabled());
        cache.put(key("k1"), json!(1));

        assert_eq!(cache.len(), 0);
        assert!(cache.get(&key("k1")).is_none());
    }

    #[test]
    fn test_expire_stale() {
        let (cache, clock) = manual_cache(Duration::from_secs(10));
        for i in 0..5 {
            cache.put(key(&format!("old{}", i)), json!(i));
        }
        clock.advance(Duration::from_secs(5));
        cache.put(key("fresh"), json!("fresh"));
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.expire_stale(), 5);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot().entry_count, 1);
        assert_eq!(cache.stats().expirations(), 5);
    }

    #[test]
    fn test_entry_expires_at_boundary() {
        let clock = ManualClock::new();
        let entry = CacheEntry::new(Arc::new(json!(null)), clock.now(), Duration::from_secs(3));
        clock.advance(Duration::from_secs(2));
        assert!(!entry.is_expired(clock.now()));

        clock.advance(Duration::from_secs(1));
        assert!(entry.is_expired(clock.now()));
    }

    #[test]
    fn test_concurrent_set_get_clear() {
        let cache = Arc::new(QueryCache::with_defaults());
        let mut handles = vec![];

        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let k = key(&format!("k{}", i % 16));
                    cache.put(k.clone(), json!({ "thread": t, "i": i }));
                    if let Some(v) = cache.get(&k) {
                        // never a partial entry
                        assert!(v["thread"].is_number() && v["i"].is_number());
                    }
                    if i % 50 == 0 {
                        cache.clear();
                    }
                    if i % 7 == 0 {
                        cache.invalidate(&k);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 16);
        assert!(cache.stats().total_requests() > 0);
    }

    #[tokio::test]
    async fn test_sweeper_purges_until_cancelled() {
        let (cache, clock) = manual_cache(Duration::from_secs(10));
        let cache = Arc::new(cache);
        cache.put(key("k1"), json!(1));
        clock.advance(Duration::from_secs(10));

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(5), cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }
}
