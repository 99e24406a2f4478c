// HTTP surface over the persistent store.
// A diagnostic read endpoint and an idempotent cleanup endpoint; neither response may be cached.

use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::Cache;
use crate::error::CacheError;

#[derive(Clone)]
struct HttpState {
    cache: Cache,
}

/// Build the router serving `/api/cache/entry` and `/api/cache/cleanup`.
pub fn router(cache: Cache) -> Router {
    Router::new()
        .route("/api/cache/entry", get(read_entry))
        .route("/api/cache/cleanup", get(cleanup).post(cleanup))
        .with_state(HttpState { cache })
}

#[derive(Debug, Deserialize)]
struct EntryQuery {
    key: Option<String>,
}

#[derive(Debug, Serialize)]
struct EntryResponse {
    value: Option<String>,
    expiry: Option<DateTime<Utc>>,
    /// Store round trip, in milliseconds.
    timing: f64,
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    removed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn read_entry(State(state): State<HttpState>, Query(query): Query<EntryQuery>) -> Response {
    let key = match query.key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            return no_store(error_response(
                StatusCode::BAD_REQUEST,
                "missing `key` query parameter",
            ));
        }
    };

    let started = Instant::now();
    let result = state.cache.entry(&key).await;
    let timing = started.elapsed().as_secs_f64() * 1_000.0;

    let response = match result {
        Ok(entry) => {
            let (value, expiry) = match entry {
                Some(entry) => (Some(entry.value), entry.expiry),
                None => (None, None),
            };
            Json(EntryResponse {
                value,
                expiry,
                timing,
            })
            .into_response()
        }
        Err(err) => {
            warn!(key = %key, error = %err, "cache entry read failed");
            error_response(status_for(&err), &err.to_string())
        }
    };

    no_store(response)
}

async fn cleanup(State(state): State<HttpState>) -> Response {
    let response = match state.cache.sweep().await {
        Ok(removed) => {
            info!(removed, "cache cleanup requested");
            Json(CleanupResponse {
                ok: true,
                removed: Some(removed),
            })
            .into_response()
        }
        Err(err) => {
            warn!(error = %err, "cache cleanup failed");
            (
                status_for(&err),
                Json(CleanupResponse {
                    ok: false,
                    removed: None,
                }),
            )
                .into_response()
        }
    };

    no_store(response)
}

fn status_for(err: &CacheError) -> StatusCode {
    match err {
        CacheError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CacheError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CacheError::ComputationFailed { .. } | CacheError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
