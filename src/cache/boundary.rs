// Consumption boundary for dedup handles.
// Turns a failed computation or a failed render into caller-supplied fallback output.

use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use super::dedup::Handle;

/// Render the settled value of `handle`, or produce `fallback` if anything fails.
///
/// Failures are contained here: the shared value stays untouched, so other
/// consumers of the same handle still render normally.
pub async fn render_or_fallback<T, R, E, F, G>(handle: &Handle<T>, render: F, fallback: G) -> R
where
    T: Send + Sync + 'static,
    E: Display,
    F: FnOnce(&T) -> Result<R, E>,
    G: FnOnce() -> R,
{
    let value = match handle.wait().await {
        Ok(value) => value,
        Err(err) => {
            warn!(
                key = handle.key(),
                scope = handle.scope(),
                error = %err,
                "cached computation failed, rendering fallback"
            );
            return fallback();
        }
    };

    match catch_unwind(AssertUnwindSafe(|| render(&*value))) {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            warn!(
                key = handle.key(),
                scope = handle.scope(),
                error = %err,
                "render failed, rendering fallback"
            );
            fallback()
        }
        Err(_) => {
            warn!(
                key = handle.key(),
                scope = handle.scope(),
                "render panicked, rendering fallback"
            );
            fallback()
        }
    }
}
