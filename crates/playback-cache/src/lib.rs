//! TTL Query Result Cache for playback analytics
//!
//! This crate provides the process-wide cache that sits in front of expensive
//! analytics and spatial queries.
//!
//! # Features
//!
//! - **TTL Expiry**: one time-to-live per cache, checked lazily on read
//! - **Fingerprinted Keys**: keys derived from a query prefix, its filter and
//!   extra parameters via canonical JSON and SHA-256
//! - **Thread-Safe**: safe for concurrent access using `RwLock`
//! - **Statistics**: track hits, misses, expirations and clears
//! - **Invalidation**: whole-cache clears on sync completion or on request
//! - **Single-flight**: optional per-key guards for concurrent misses
//!
//! # Example
//!
//! ```ignore
//! use playback_cache::{CacheConfig, CacheKey, QueryCache};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(QueryCache::new(CacheConfig::default()));
//! let key = CacheKey::for_query("AnalyticsTrends", &filter, &())?;
//!
//! if let Some(result) = cache.get(&key) {
//!     return Ok(result);
//! }
//!
//! let result = run_query(&filter).await?;
//! cache.put(key, serde_json::to_value(&result)?);
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod inflight;
pub mod invalidation;
pub mod key;
pub mod stats;

pub use cache::{CacheEntry, CachedValue, QueryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use invalidation::{
    CacheInvalidator, InvalidationEvent, NoOpInvalidator, SyncInvalidationHook, SyncObserver,
};
pub use key::{CacheKey, KeyError};
pub use stats::{CacheStats, CacheStatsSnapshot};
