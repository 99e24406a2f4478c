//! Render-scoped deduplication of in-flight work.
//!
//! A [`RenderScope`] lives for one render or request. The first caller to ask
//! for a key supplies the computation; every later caller in the same scope,
//! concurrent or not, receives a [`Handle`] to that same computation and
//! observes the same value or the same failure. Nothing is retried, and the
//! key map is discarded with the scope.
//!
//! Creating a handle never waits. The first request for a key invokes the
//! computation on the spot and spawns its future onto the current Tokio
//! runtime, so it runs to completion even if every holder is dropped and the
//! scope is finished. Holders observe it through a [`Shared`] future. Outside
//! a runtime the future only advances while a holder awaits it.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{BoxError, CacheError, Result};

type ErasedValue = Arc<dyn Any + Send + Sync>;
type ErasedError = Arc<dyn std::error::Error + Send + Sync>;
type SharedComputation = Shared<BoxFuture<'static, std::result::Result<ErasedValue, ErasedError>>>;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Error recorded when a computation panics instead of returning.
#[derive(Debug)]
struct ComputationPanicked(String);

impl fmt::Display for ComputationPanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computation panicked: {}", self.0)
    }
}

impl std::error::Error for ComputationPanicked {}

/// Per-render map from key to a pending or settled computation.
pub struct RenderScope {
    id: u64,
    entries: Mutex<HashMap<String, SharedComputation>>,
}

impl RenderScope {
    /// Open a new scope with a fresh, process-monotonic id.
    pub fn new() -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        trace!(scope = id, "render scope opened");
        Self {
            id,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the handle for `key`, registering `compute` if this is the first request.
    ///
    /// `compute` is invoked exactly once per key for the lifetime of this
    /// scope, synchronously and before this returns. It must not call back
    /// into the same scope directly; the future it returns may. Reusing a key
    /// with a different value type yields a handle that resolves to
    /// [`CacheError::InvalidInput`].
    pub fn get_or_create<T, F, Fut, E>(&self, key: impl Into<String>, compute: F) -> Handle<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let key = key.into();
        let (inner, created) = {
            let mut entries = self.entries.lock();
            match entries.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    trace!(scope = self.id, %key, "joining existing computation");
                    (existing.get().clone(), false)
                }
                Entry::Vacant(vacant) => {
                    debug!(scope = self.id, %key, "registering computation");
                    (vacant.insert(erase(compute)).clone(), true)
                }
            }
        };

        if created {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(inner.clone());
                }
                Err(_) => {
                    debug!(scope = self.id, %key, "no runtime, computation advances when awaited");
                }
            }
        }

        Handle {
            key,
            scope: self.id,
            inner,
            _value: PhantomData,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End the scope, discarding every entry.
    ///
    /// Handles already given out still resolve; the scope just stops handing them out.
    pub fn finish(self) {
        // Drop does the work.
    }
}

impl Default for RenderScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RenderScope {
    fn drop(&mut self) {
        trace!(scope = self.id, entries = self.entries.get_mut().len(), "render scope closed");
    }
}

impl fmt::Debug for RenderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("id", &self.id)
            .field("entries", &self.len())
            .finish()
    }
}

fn erase<T, F, Fut, E>(compute: F) -> SharedComputation
where
    T: Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    E: Into<BoxError>,
{
    let pending = match std::panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(future) => future,
        Err(panic) => return settled(Err(panicked(panic))),
    };

    async move {
        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(Ok(value)) => Ok(Arc::new(value) as ErasedValue),
            Ok(Err(err)) => {
                let reason: BoxError = err.into();
                Err(ErasedError::from(reason))
            }
            Err(panic) => Err(panicked(panic)),
        }
    }
    .boxed()
    .shared()
}

fn settled(outcome: std::result::Result<ErasedValue, ErasedError>) -> SharedComputation {
    futures::future::ready(outcome).boxed().shared()
}

fn panicked(panic: Box<dyn Any + Send>) -> ErasedError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    Arc::new(ComputationPanicked(message))
}

/// Shared handle to one scope's computation for a key.
pub struct Handle<T> {
    key: String,
    scope: u64,
    inner: SharedComputation,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            scope: self.scope,
            inner: self.inner.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T> Handle<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scope(&self) -> u64 {
        self.scope
    }

    /// Whether the computation has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.inner.peek().is_some()
    }
}

impl<T: Send + Sync + 'static> Handle<T> {
    /// Wait for the shared result. Every holder sees the same value or failure.
    pub async fn wait(&self) -> Result<Arc<T>> {
        match self.inner.clone().await {
            Ok(value) => value.downcast::<T>().map_err(|_| {
                CacheError::invalid(format!(
                    "dedup key `{}` in render scope {} holds a different value type",
                    self.key, self.scope
                ))
            }),
            Err(reason) => Err(CacheError::ComputationFailed {
                key: self.key.clone(),
                scope: Some(self.scope),
                reason,
            }),
        }
    }
}
