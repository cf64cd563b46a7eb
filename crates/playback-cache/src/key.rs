//! Cache key derivation
//!
//! A key is `"{prefix}:{fingerprint}"` where the fingerprint is the SHA-256 of
//! the canonical JSON encoding of the prefix and the key material. The
//! material is converted to a `serde_json::Value` first; its object maps are
//! ordered, so the encoding depends only on field values and never on
//! insertion or hash-map iteration order.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("cannot derive cache key for '{prefix}': {source}")]
pub struct KeyError {
    prefix: String,
    #[source]
    source: serde_json::Error,
}

/// Key for cache lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct Fingerprinted<'a, M: ?Sized> {
    prefix: &'a str,
    material: &'a M,
}

#[derive(Serialize)]
struct QueryMaterial<'a, F: ?Sized, P: ?Sized> {
    filter: &'a F,
    params: &'a P,
}

impl CacheKey {
    /// Derive a key from a prefix naming the logical query and any
    /// serializable key material
    pub fn derive<M>(prefix: &str, material: &M) -> Result<Self, KeyError>
    where
        M: Serialize + ?Sized,
    {
        let canonical = serde_json::to_value(Fingerprinted { prefix, material })
            .and_then(|value| serde_json::to_vec(&value))
            .map_err(|source| KeyError {
                prefix: prefix.to_string(),
                source,
            })?;

        let digest = Sha256::digest(&canonical);
        Ok(Self(format!("{}:{}", prefix, hex::encode(digest))))
    }

    /// Derive the key for a query identified by `prefix`, scoped by a filter
    /// and extra typed parameters (use `&()` when there are none)
    pub fn for_query<F, P>(prefix: &str, filter: &F, params: &P) -> Result<Self, KeyError>
    where
        F: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        Self::derive(prefix, &QueryMaterial { filter, params })
    }

    /// Wrap an already-computed key
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical query name the key was derived for
    pub fn prefix(&self) -> &str {
        self.0.rsplit_once(':').map_or(&self.0, |(prefix, _)| prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::from_raw(key)
    }
}
