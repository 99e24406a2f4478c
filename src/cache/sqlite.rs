//! Persistent cache backed by SQLite.
//! One row per key, expiry stored as epoch milliseconds (NULL = never expires).
//! Safe for several processes sharing the same database file (WAL + busy timeout).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};

use super::store::{CacheBackend, CacheEntry};
use super::ttl::Ttl;

/// Default time a connection waits on a lock held by another writer.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        expiry INTEGER
    );
    CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry
        ON cache_entries(expiry) WHERE expiry IS NOT NULL;";

/// SQLite-backed persistent store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CacheError::unavailable("create store directory", e))?;
            }
        }

        let conn =
            Connection::open(db_path).map_err(|e| CacheError::unavailable("open store", e))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| CacheError::unavailable("configure store", e))?;
        // WAL lets readers in other processes proceed while one writer holds the lock.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CacheError::unavailable("configure store", e))?;

        let store = Self::from_connection(conn)?;
        info!(path = %db_path.display(), "SQLite cache store opened");
        Ok(store)
    }

    /// Open a private in-memory store. Nothing is shared with other connections.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::unavailable("open store", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| CacheError::unavailable("create schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` on the connection without blocking the async runtime.
    async fn with_conn<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await
        .map_err(|e| CacheError::unavailable(operation, e))?;

        outcome.map_err(|e| {
            warn!(error = %e, operation, "SQLite cache operation failed");
            CacheError::unavailable(operation, e)
        })
    }
}

/// Expiry column value for a write at `now`.
///
/// The column holds whole milliseconds. A positive TTL rounds up so the row
/// never reads as expired before its exact expiry; zero and negative TTLs
/// round down and stay expired on write.
fn stored_expiry(ttl: Ttl, now: DateTime<Utc>) -> i64 {
    let at = ttl.expiry_from(now);
    let millis = at.timestamp_millis();
    if ttl.as_delta() > TimeDelta::zero() && at.timestamp_subsec_nanos() % 1_000_000 != 0 {
        millis.saturating_add(1)
    } else {
        millis
    }
}

#[async_trait]
impl CacheBackend for SqliteStore {
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        let cutoff = Utc::now().timestamp_millis();

        let row = self
            .with_conn("get", move |conn| {
                conn.query_row(
                    "SELECT value, expiry FROM cache_entries
                     WHERE key = ?1 AND (expiry IS NULL OR expiry > ?2)",
                    params![key, cutoff],
                    |row| {
                        Ok(CacheEntry {
                            key: key.clone(),
                            value: row.get(0)?,
                            expiry: row
                                .get::<_, Option<i64>>(1)?
                                .and_then(DateTime::<Utc>::from_timestamp_millis),
                        })
                    },
                )
                .optional()
            })
            .await?;

        if row.is_some() {
            debug!("cache store hit");
        }
        Ok(row)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now();
        let expiry = ttl.map(|ttl| stored_expiry(ttl, now));

        self.with_conn("set", move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, expiry) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expiry = excluded.expiry",
                params![key, value, expiry],
            )
            .map(|_| ())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn("delete", move |conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map(|count| count > 0)
        })
        .await
    }

    async fn delete_expired(&self) -> Result<u64> {
        // Rows written after this instant with a future expiry fall outside the predicate.
        let cutoff = Utc::now().timestamp_millis();
        let removed = self
            .with_conn("delete_expired", move |conn| {
                conn.execute(
                    "DELETE FROM cache_entries WHERE expiry IS NOT NULL AND expiry <= ?1",
                    params![cutoff],
                )
            })
            .await?;

        if removed > 0 {
            info!(removed, "cache store cleanup");
        } else {
            debug!("cache store cleanup found nothing to remove");
        }
        Ok(removed as u64)
    }
}
