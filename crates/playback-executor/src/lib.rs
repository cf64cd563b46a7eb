//! Cache-first execution of parameterized playback queries
//!
//! A query is identified by a prefix, takes a [`LocationStatsFilter`] built
//! from the request plus optional extra parameters, and produces a
//! serializable result. [`CachedQueryExecutor`] checks the backend, builds the
//! filter, serves or fills the shared cache, and wraps the outcome in an
//! [`ApiResponse`] envelope.
//!
//! [`LocationStatsFilter`]: playback_core::LocationStatsFilter
//! [`ApiResponse`]: playback_core::ApiResponse

pub mod backend;
pub mod cached_executor;

pub use backend::{Capability, QueryBackend, StaticBackend};
pub use cached_executor::{CachedQueryExecutor, QueryRequest, QueryResponse, QuerySpec};
