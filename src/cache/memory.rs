// In-process persistent-store implementation.
// Same contract as the SQLite store, scoped to one process; used for tests and single-node setups.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::Result;

use super::store::{CacheBackend, CacheEntry};
use super::ttl::Ttl;

/// Mutex-guarded map of cache rows.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical rows, expired ones included.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        let rows = self.rows.lock();
        Ok(rows.get(key).filter(|entry| entry.is_live(now)).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> Result<()> {
        let entry = CacheEntry::new(key, value, ttl, Utc::now());
        self.rows.lock().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.rows.lock().remove(key).is_some())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|_, entry| entry.is_live(now));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_expiry_keeps_row_until_sweep() {
        let store = MemoryStore::new();
        store.set("a", "v1", Some(Ttl::ZERO)).await.unwrap();
        store.set("b", "v2", None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.len(), 2);

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert_eq!(store.delete_expired().await.unwrap(), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = MemoryStore::new();
        store.set("k", "first", Some(Ttl::hours(1))).await.unwrap();
        store.set("k", "second", None).await.unwrap();

        let entry = store.get_entry("k").await.unwrap().unwrap();
        assert_eq!(entry.value, "second");
        assert!(entry.expiry.is_none());
        assert!(store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }
}
