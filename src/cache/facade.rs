// Cross-request cache facade.
// Typed JSON reads and writes over a persistent store, plus read-through computation.

use std::future::Future;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{BoxError, CacheError, Result};

use super::keys::CacheKey;
use super::store::{CacheBackend, CacheEntry};
use super::ttl::Ttl;

/// Handle to the persistent cache tier.
///
/// Constructed once at startup and cloned into every caller; clones share the
/// same backend.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Live row for a raw key string, as stored.
    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.backend.get_entry(key).await
    }

    /// Live serialized payload for `key`.
    pub async fn get_raw(&self, key: &CacheKey) -> Result<Option<String>> {
        self.backend.get(&key.to_string()).await
    }

    /// Write an already-serialized payload.
    pub async fn set_raw(&self, key: &CacheKey, value: &str, ttl: Option<Ttl>) -> Result<()> {
        self.backend.set(&key.to_string(), value, ttl).await
    }

    /// Live value for `key`, deserialized as `T`.
    ///
    /// A payload that no longer matches `T` is an error, not a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` as JSON and upsert it. `None` TTL means no expiry.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Ttl>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw, ttl).await
    }

    /// Read-through lookup: return the cached value or compute, store and return it.
    ///
    /// Store failures propagate unchanged so the caller can choose between
    /// computing without the cache and reporting degraded service.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl: Option<Ttl>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        if let Some(hit) = self.get(key).await? {
            debug!(%key, "cache hit");
            return Ok(hit);
        }

        debug!(%key, "cache miss, computing");
        let value = compute().await.map_err(|err| {
            let reason: BoxError = err.into();
            warn!(%key, error = %reason, "cache computation failed");
            CacheError::ComputationFailed {
                key: key.to_string(),
                scope: None,
                reason: Arc::from(reason),
            }
        })?;

        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    /// Remove `key` outright. Administrative only; stale data is retired by key versioning.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }

    /// Remove expired rows. Returns how many were removed.
    pub async fn sweep(&self) -> Result<u64> {
        self.backend.delete_expired().await
    }
}
