// Cache module for GitHub-backed data.
// Two tiers: a persistent TTL'd store shared across requests, and a render-scoped dedup cache.

pub mod boundary;
pub mod dedup;
pub mod facade;
pub mod freshness;
pub mod keys;
pub mod memory;
pub mod paths;
pub mod sqlite;
pub mod store;
pub mod sweeper;
pub mod ttl;

pub use boundary::render_or_fallback;
pub use dedup::{Handle, RenderScope};
pub use facade::Cache;
pub use freshness::FreshnessStamp;
pub use keys::{CacheKey, ResourceKind, Segment, StampRule};
pub use memory::MemoryStore;
pub use paths::{cache_dir, database_path};
pub use sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteStore};
pub use store::{CacheBackend, CacheEntry};
pub use ttl::Ttl;
