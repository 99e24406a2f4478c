// ghcache - caching subsystem for GitHub-backed pages.
// Freshness-versioned keys, a TTL'd persistent store, and render-scoped request dedup.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod http;
pub mod telemetry;

pub use cache::{Cache, CacheKey, FreshnessStamp, RenderScope, ResourceKind, Ttl};
pub use error::{AppError, CacheError, Result};
