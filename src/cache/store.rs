// Persistent store contract.
// Key -> opaque value rows with an optional absolute expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::ttl::{self, Ttl};

/// One row of the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique key.
    pub key: String,
    /// Opaque payload; the store never interprets it.
    pub value: String,
    /// Absolute expiry. `None` means the row is never swept.
    pub expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create an entry written at `now` with the given TTL.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Ttl>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expiry: ttl::expiry_for(now, ttl),
        }
    }

    /// Check if this entry has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        ttl::is_expired(self.expiry, now)
    }

    /// Check if this entry is still live as of `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }
}

/// Durable key/value table with per-entry expiry.
///
/// Every read enforces expiry itself: a row past its expiry reads as a miss
/// whether or not [`delete_expired`](CacheBackend::delete_expired) has run.
/// I/O failures surface as [`CacheError::StoreUnavailable`](crate::error::CacheError),
/// never as a miss.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the live row for `key`, if any.
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Upsert `key`. A `None` TTL stores the row without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> Result<()>;

    /// Remove `key` regardless of expiry. Returns whether a row existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every row whose expiry is at or before the sweep's start time.
    async fn delete_expired(&self) -> Result<u64>;

    /// Fetch the live value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_ttl_never_expires() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", "v", None, now);
        assert!(entry.expiry.is_none());
        assert!(entry.is_live(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_entry_expires() {
        let now = Utc::now();
        let entry = CacheEntry::new("k", "v", Some(Ttl::seconds(300)), now);

        assert!(entry.is_live(now));
        assert!(entry.is_expired(now + chrono::Duration::seconds(600)));
    }
}
