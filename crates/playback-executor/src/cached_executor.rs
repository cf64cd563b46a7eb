//! Cached Query Executor
//!
//! Every cacheable analytics and spatial endpoint follows the same flow:
//!
//! 1. Check the backend (and any capability the query needs) is available
//! 2. Build the filter from the request's query parameters
//! 3. Derive the cache key from prefix + filter + extra parameters
//! 4. Serve a cache hit with `cached: true` and zero query time
//! 5. Otherwise run the query, time it, store the result and respond
//!
//! [`CachedQueryExecutor::execute`] implements that flow once; the
//! `execute_simple`, `execute_with_param` and `execute_spatial` flavors only
//! choose the key material and the capability.

use crate::backend::{Capability, QueryBackend};
use playback_cache::{CacheKey, CacheStatsSnapshot, CachedValue, InFlightRegistry, QueryCache};
use playback_core::{
    ApiResponse, LocationStatsFilter, QueryError, QueryParams, RequestContext, Result,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Successful executor response
pub type QueryResponse = ApiResponse<CachedValue>;

/// An inbound request as seen by the executor
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub params: QueryParams,
    pub context: RequestContext,
}

impl QueryRequest {
    pub fn new(params: QueryParams) -> Self {
        Self {
            params,
            context: RequestContext::new(),
        }
    }

    pub fn with_context(params: QueryParams, context: RequestContext) -> Self {
        Self { params, context }
    }
}

/// Identifies a logical query and what it needs from the backend
#[derive(Debug, Clone, Copy)]
pub struct QuerySpec<'a> {
    /// Cache key prefix, e.g. `"SpatialViewport"`
    pub prefix: &'a str,
    pub capability: Option<Capability>,
}

impl<'a> QuerySpec<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            capability: None,
        }
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }
}

/// A query executor with built-in caching support.
///
/// Both collaborators are optional: without a backend every call is rejected
/// as unavailable, without a cache every call runs the query.
pub struct CachedQueryExecutor {
    backend: Option<Arc<dyn QueryBackend>>,
    cache: Option<Arc<QueryCache>>,
    inflight: Option<Arc<InFlightRegistry>>,
}

impl CachedQueryExecutor {
    pub fn new(backend: Option<Arc<dyn QueryBackend>>, cache: Option<Arc<QueryCache>>) -> Self {
        Self {
            backend,
            cache,
            inflight: None,
        }
    }

    /// Collapse concurrent misses for the same key into one query execution
    pub fn with_single_flight(mut self) -> Self {
        self.inflight = Some(Arc::new(InFlightRegistry::new()));
        self
    }

    /// Execute a query that is keyed by the filter alone
    pub async fn execute_simple<T, F, Fut>(
        &self,
        request: &QueryRequest,
        prefix: &str,
        query_fn: F,
    ) -> Result<QueryResponse>
    where
        T: Serialize,
        F: FnOnce(RequestContext, LocationStatsFilter) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.execute(request, QuerySpec::new(prefix), &(), (), |ctx, filter, ()| {
            query_fn(ctx, filter)
        })
        .await
    }

    /// Execute a query that takes one extra parameter (a limit, an interval,
    /// ...). The parameter is part of the cache key.
    pub async fn execute_with_param<P, T, F, Fut>(
        &self,
        request: &QueryRequest,
        prefix: &str,
        param: P,
        query_fn: F,
    ) -> Result<QueryResponse>
    where
        P: Serialize + Clone,
        T: Serialize,
        F: FnOnce(RequestContext, LocationStatsFilter, P) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let key_params = param.clone();
        self.execute(request, QuerySpec::new(prefix), &key_params, param, query_fn)
            .await
    }

    /// Execute a spatial query. Fails with `ExtensionUnavailable` when the
    /// backend has no spatial support. `key_params` and `query_params` are
    /// often the same value but may differ when the query takes more than
    /// should scope the cache.
    pub async fn execute_spatial<K, P, T, F, Fut>(
        &self,
        request: &QueryRequest,
        prefix: &str,
        key_params: &K,
        query_params: P,
        query_fn: F,
    ) -> Result<QueryResponse>
    where
        K: Serialize + ?Sized,
        T: Serialize,
        F: FnOnce(RequestContext, LocationStatsFilter, P) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let spec = QuerySpec::new(prefix).requires(Capability::Spatial);
        self.execute(request, spec, key_params, query_params, query_fn)
            .await
    }

    /// Run the cache-first flow for one request.
    ///
    /// Errors are terminal: nothing is retried and nothing is cached on
    /// failure. The request's cancellation token is handed to `query_fn`
    /// untouched.
    pub async fn execute<K, P, T, F, Fut>(
        &self,
        request: &QueryRequest,
        spec: QuerySpec<'_>,
        key_params: &K,
        query_params: P,
        query_fn: F,
    ) -> Result<QueryResponse>
    where
        K: Serialize + ?Sized,
        T: Serialize,
        F: FnOnce(RequestContext, LocationStatsFilter, P) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.check_preconditions(&spec)?;

        let filter = LocationStatsFilter::from_params(&request.params)?;
        let key = self.derive_key(spec.prefix, &filter, key_params);

        // with single-flight the miss is counted once the key's guard is held
        let count_miss = self.inflight.is_none();
        if let Some(hit) = self.lookup(key.as_ref(), count_miss) {
            return Ok(ApiResponse::cached(hit));
        }

        let _in_flight = match (&self.inflight, &key) {
            (Some(registry), Some(key)) => {
                let guard = registry.acquire(key).await;
                // another caller may have filled the entry while we waited
                if let Some(hit) = self.lookup(Some(key), true) {
                    return Ok(ApiResponse::cached(hit));
                }
                Some(guard)
            }
            _ => None,
        };

        let ctx = request.context.clone();
        let request_id = ctx.request_id();
        let start = Instant::now();
        let result = query_fn(ctx, filter, query_params).await;
        let query_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let data = result
            .and_then(|data| serde_json::to_value(data).map_err(anyhow::Error::from))
            .map_err(|err| {
                tracing::error!(
                    prefix = spec.prefix,
                    key = key.as_ref().map(CacheKey::as_str),
                    %request_id,
                    error = %format!("{:#}", err),
                    "Query execution failed"
                );
                QueryError::query_failed(spec.prefix, err)
            })?;
        let data = Arc::new(data);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put_shared(key, Arc::clone(&data));
        }

        tracing::debug!(prefix = spec.prefix, query_time_ms, "Query executed");
        Ok(ApiResponse::computed(data, query_time_ms))
    }

    fn check_preconditions(&self, spec: &QuerySpec<'_>) -> Result<()> {
        let backend = match &self.backend {
            Some(backend) if backend.is_available() => backend,
            _ => {
                tracing::warn!(prefix = spec.prefix, "Rejected query: backend not available");
                return Err(QueryError::ServiceUnavailable);
            }
        };

        if let Some(capability) = spec.capability {
            if !backend.supports(capability) {
                tracing::warn!(
                    prefix = spec.prefix,
                    %capability,
                    "Rejected query: capability not available"
                );
                return Err(QueryError::extension_unavailable(capability.as_str()));
            }
        }

        Ok(())
    }

    /// Key for this request, or `None` when there is no enabled cache to
    /// address or the key material cannot be encoded (the query then runs
    /// uncached)
    fn derive_key<K>(
        &self,
        prefix: &str,
        filter: &LocationStatsFilter,
        params: &K,
    ) -> Option<CacheKey>
    where
        K: Serialize + ?Sized,
    {
        self.cache.as_ref().filter(|c| c.is_enabled())?;
        match CacheKey::for_query(prefix, filter, params) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(prefix, error = %err, "Running query uncached");
                None
            }
        }
    }

    fn lookup(&self, key: Option<&CacheKey>, count_miss: bool) -> Option<CachedValue> {
        let (cache, key) = (self.cache.as_ref()?, key?);
        let hit = if count_miss {
            cache.get(key)
        } else {
            cache.get_if_present(key)
        };
        tracing::debug!(key = key.as_str(), hit = hit.is_some(), "Cache lookup");
        hit
    }

    /// Get the underlying cache
    pub fn cache(&self) -> Option<&Arc<QueryCache>> {
        self.cache.as_ref()
    }

    /// Check if results are being cached
    pub fn is_cache_enabled(&self) -> bool {
        self.cache.as_ref().is_some_and(|c| c.is_enabled())
    }

    /// Get cache statistics, if there is a cache
    pub fn cache_stats(&self) -> Option<CacheStatsSnapshot> {
        self.cache.as_ref().map(|c| c.snapshot())
    }

    /// Clear all cached entries
    pub fn clear_cache(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.clear())
    }
}

impl std::fmt::Debug for CachedQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedQueryExecutor")
            .field("has_backend", &self.backend.is_some())
            .field("cache", &self.cache)
            .field("single_flight", &self.inflight.is_some())
            .finish()
    }
}
