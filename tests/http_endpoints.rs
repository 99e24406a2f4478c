use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header::CACHE_CONTROL},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use ghcache::cache::{Cache, CacheBackend, CacheEntry, MemoryStore, SqliteStore, Ttl};
use ghcache::error::{CacheError, Result};
use ghcache::http::router;

struct UnreachableStore;

#[async_trait]
impl CacheBackend for UnreachableStore {
    async fn get_entry(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Err(unreachable_error("get"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Ttl>) -> Result<()> {
        Err(unreachable_error("set"))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(unreachable_error("delete"))
    }

    async fn delete_expired(&self) -> Result<u64> {
        Err(unreachable_error("delete_expired"))
    }
}

fn unreachable_error(operation: &'static str) -> CacheError {
    CacheError::unavailable(
        operation,
        std::io::Error::new(std::io::ErrorKind::TimedOut, "database is locked"),
    )
}

async fn send(cache: Cache, method: Method, uri: &str) -> Response {
    router(cache)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response")
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn assert_no_store(response: &Response) {
    assert_eq!(
        response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok()),
        Some("no-store")
    );
}

#[tokio::test]
async fn read_endpoint_returns_live_value_with_timing() {
    let store = Arc::new(MemoryStore::new());
    store
        .set("issue-count:octo:hello", "12", Some(Ttl::hours(1)))
        .await
        .unwrap();
    let cache = Cache::from_backend(store);

    let response = send(
        cache,
        Method::GET,
        "/api/cache/entry?key=issue-count:octo:hello",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_no_store(&response);

    let body = json_body(response).await;
    assert_eq!(body["value"], "12");
    assert!(body["expiry"].is_string());
    assert!(body["timing"].as_f64().is_some_and(|ms| ms >= 0.0));
}

#[tokio::test]
async fn read_endpoint_reports_expired_rows_as_miss() {
    let store = Arc::new(MemoryStore::new());
    store.set("a", "v1", Some(Ttl::ZERO)).await.unwrap();
    let cache = Cache::from_backend(store.clone());

    let response = send(cache, Method::GET, "/api/cache/entry?key=a").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_no_store(&response);

    let body = json_body(response).await;
    assert!(body["value"].is_null());
    assert!(body["expiry"].is_null());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn read_endpoint_accepts_escaped_key_segments() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .set("markdown:octo:hello:docs%3Aintro.md:1704067200000", "<p>hi</p>", None)
        .await
        .unwrap();
    let cache = Cache::new(store);

    let response = send(
        cache,
        Method::GET,
        "/api/cache/entry?key=markdown%3Aocto%3Ahello%3Adocs%253Aintro.md%3A1704067200000",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["value"], "<p>hi</p>");
    assert!(body["expiry"].is_null());
}

#[tokio::test]
async fn read_endpoint_requires_key() {
    let cache = Cache::new(MemoryStore::new());

    let response = send(cache.clone(), Method::GET, "/api/cache/entry").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_no_store(&response);

    let response = send(cache, Method::GET, "/api/cache/entry?key=%20").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn read_endpoint_surfaces_unavailable_store() {
    let cache = Cache::new(UnreachableStore);

    let response = send(cache, Method::GET, "/api/cache/entry?key=a").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_store(&response);

    let body = json_body(response).await;
    assert!(body["error"].as_str().is_some_and(|msg| msg.contains("unavailable")));
}

#[tokio::test]
async fn cleanup_removes_expired_rows_and_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    store.set("a", "v1", Some(Ttl::ZERO)).await.unwrap();
    store.set("b", "v2", None).await.unwrap();
    let cache = Cache::from_backend(store.clone());

    let response = send(cache.clone(), Method::POST, "/api/cache/cleanup").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_no_store(&response);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["removed"], 1);

    let response = send(cache, Method::GET, "/api/cache/cleanup").await;
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["removed"], 0);

    assert_eq!(store.get("b").await.unwrap().as_deref(), Some("v2"));
}

#[tokio::test]
async fn cleanup_reports_failure_without_count() {
    let cache = Cache::new(UnreachableStore);

    let response = send(cache, Method::POST, "/api/cache/cleanup").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_store(&response);

    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(body.get("removed").is_none());
}
