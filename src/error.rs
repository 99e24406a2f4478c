// Error types for the ghcache subsystem.
// Separates "not cached" (an Option) from "cache unreachable" and failed computations.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a caller-supplied computation.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by the cache subsystem.
///
/// A miss is never represented here; reads return `Ok(None)` instead.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("invalid cache input: {0}")]
    InvalidInput(String),

    #[error("cache store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("computation for `{key}` failed{}: {reason}", scope_suffix(.scope))]
    ComputationFailed {
        key: String,
        scope: Option<u64>,
        reason: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("cached value could not be (de)serialized: {0}")]
    Json(Arc<serde_json::Error>),
}

impl CacheError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Wrap an I/O level failure of the backing store.
    pub fn unavailable<E>(operation: &'static str, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::StoreUnavailable {
            operation,
            source: Arc::new(source),
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    pub fn is_computation_failed(&self) -> bool {
        matches!(self, Self::ComputationFailed { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

fn scope_suffix(scope: &Option<u64>) -> String {
    match scope {
        Some(id) => format!(" in render scope {id}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Top-level errors for the `ghcache` binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] crate::config::LoadError),

    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_computation_failed_mentions_scope() {
        let reason: BoxError = "upstream returned 502".into();
        let err = CacheError::ComputationFailed {
            key: "readme:u:r:1".to_string(),
            scope: Some(7),
            reason: Arc::from(reason),
        };
        let message = err.to_string();
        assert!(message.contains("readme:u:r:1"));
        assert!(message.contains("render scope 7"));
        assert!(message.contains("upstream returned 502"));
        assert!(err.is_computation_failed());
    }

    #[test]
    fn test_store_unavailable_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "disk stalled");
        let err = CacheError::unavailable("get", io);
        assert!(err.is_store_unavailable());
        assert!(StdError::source(&err).is_some());
        assert!(err.to_string().contains("during get"));
    }
}
