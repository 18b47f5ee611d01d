// tests/import_and_errors.rs
//
// POST /import/ outcomes and the store-failure mapping (503 on unavailable
// or slow stores, JSON error bodies).

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{app_with, get_json, post, sample_events, store_with};
use event_analytics::event::{Event, Field};
use event_analytics::query::pipeline::{Pipeline, Row};
use event_analytics::query::predicate::Predicate;
use event_analytics::store::{CollectionAccessor, Cursor, FindOptions, StoreError};
use event_analytics::AppConfig;

fn config_with_import(path: std::path::PathBuf) -> AppConfig {
    AppConfig {
        import_path: path,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn import_missing_file_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with(sample_events()).await;
    let app = app_with(store.clone(), config_with_import(dir.path().join("jsondata.json")));

    let (status, body) = post(&app, "/api/import/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
    assert_eq!(store.len(), 4, "nothing is deleted when the file is missing");
}

#[tokio::test]
async fn import_replaces_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jsondata.json");
    std::fs::write(
        &path,
        r#"[
            {"title": "Fresh", "country": "Chad", "intensity": "7",
             "published": "January, 20 2017 03:51:25", "extra": "ignored"},
            {"title": "Second", "country": "Chad", "intensity": ""},
            "not an object"
        ]"#,
    )
    .unwrap();

    let store = store_with(sample_events()).await;
    let app = app_with(store.clone(), config_with_import(path));

    let (status, body) = post(&app, "/api/import/").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"imported": 2}));
    assert_eq!(store.len(), 2);

    let (_, rows) = get_json(&app, "/api/agg/count-by-country/").await;
    assert_eq!(rows, json!([{"country": "Chad", "count": 2}]));

    let (_, page) = get_json(&app, "/api/events/?intensity_min=7").await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["results"][0]["published_year"], 2017);
    assert_eq!(page["results"][0]["published_iso"], "2017-01-20T03:51:25");
    assert!(page["results"][0].get("extra").is_none());
}

#[tokio::test]
async fn import_rejects_non_array_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jsondata.json");
    std::fs::write(&path, r#"{"title": "not a list"}"#).unwrap();

    let store = store_with(sample_events()).await;
    let app = app_with(store.clone(), config_with_import(path));
    let (status, body) = post(&app, "/api/import/").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
    assert_eq!(store.len(), 4);
}

/// Store whose every operation fails as unreachable.
struct DownStore;

#[async_trait::async_trait]
impl CollectionAccessor for DownStore {
    async fn find(&self, _: &Predicate, _: &FindOptions) -> Result<Cursor, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn count(&self, _: &Predicate) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn aggregate(&self, _: &Pipeline) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn distinct(&self, _: Field) -> Result<Vec<Value>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn delete_all(&self) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn insert_many(&self, _: Vec<Event>) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn create_indexes(&self, _: &[Field]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Store that never answers within any reasonable timeout.
struct StalledStore;

impl StalledStore {
    async fn stall<T>() -> Result<T, StoreError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(StoreError::Unavailable("stalled".into()))
    }
}

#[async_trait::async_trait]
impl CollectionAccessor for StalledStore {
    async fn find(&self, _: &Predicate, _: &FindOptions) -> Result<Cursor, StoreError> {
        Self::stall().await
    }
    async fn count(&self, _: &Predicate) -> Result<u64, StoreError> {
        Self::stall().await
    }
    async fn aggregate(&self, _: &Pipeline) -> Result<Vec<Row>, StoreError> {
        Self::stall().await
    }
    async fn distinct(&self, _: Field) -> Result<Vec<Value>, StoreError> {
        Self::stall().await
    }
    async fn delete_all(&self) -> Result<u64, StoreError> {
        Self::stall().await
    }
    async fn insert_many(&self, _: Vec<Event>) -> Result<u64, StoreError> {
        Self::stall().await
    }
    async fn create_indexes(&self, _: &[Field]) -> Result<(), StoreError> {
        Self::stall().await
    }
}

#[tokio::test]
async fn unavailable_store_is_503() {
    let app = app_with(Arc::new(DownStore), AppConfig::default());
    for uri in [
        "/api/events/",
        "/api/agg/count-by-country/",
        "/api/agg/scatter-intensity-likelihood/",
        "/api/meta/filters/",
        "/api/export/csv/",
    ] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert!(body["error"].as_str().unwrap().contains("unavailable"), "{uri}");
    }
}

#[tokio::test]
async fn slow_store_times_out_as_503() {
    let cfg = AppConfig {
        store_timeout_ms: 50,
        ..AppConfig::default()
    };
    let app = app_with(Arc::new(StalledStore), cfg);
    let started = std::time::Instant::now();
    let (status, body) = get_json(&app, "/api/agg/top-topics/").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(5));
}
