// tests/common/mod.rs
//
// Shared fixtures for the HTTP-level tests: an in-memory store, the router the
// binary uses, and small request helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _;

use event_analytics::event::{Event, Scalar};
use event_analytics::store::{CollectionAccessor, MemoryStore, REQUIRED_INDEXES};
use event_analytics::{router, AppConfig, AppState};

pub const BODY_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Default, Clone)]
pub struct Doc {
    pub title: &'static str,
    pub country: Option<&'static str>,
    pub region: Option<&'static str>,
    pub topic: Option<&'static str>,
    pub sector: Option<&'static str>,
    pub year: Option<i64>,
    pub end_year: Option<i64>,
    pub intensity: Option<Scalar>,
    pub likelihood: Option<Scalar>,
}

impl Doc {
    pub fn event(&self) -> Event {
        Event {
            title: Some(self.title.to_string()),
            country: self.country.map(str::to_string),
            region: self.region.map(str::to_string),
            topic: self.topic.map(str::to_string),
            sector: self.sector.map(str::to_string),
            published_year: self.year,
            published_iso: self.year.map(|y| format!("{y}-01-01T00:00:00")),
            end_year: self.end_year.map(Scalar::Int),
            intensity: self.intensity.clone(),
            likelihood: self.likelihood.clone(),
            ..Event::default()
        }
    }
}

/// A small, hand-checked collection.
pub fn sample_events() -> Vec<Event> {
    [
        Doc {
            title: "Oil output cut",
            country: Some("India"),
            region: Some("Southern Asia"),
            topic: Some("oil"),
            sector: Some("Energy"),
            year: Some(2017),
            end_year: Some(2020),
            intensity: Some(Scalar::Int(6)),
            likelihood: Some(Scalar::Int(3)),
        },
        Doc {
            title: "Gas prices rise",
            country: Some("India"),
            region: Some("Southern Asia"),
            topic: Some("gas"),
            sector: Some("Energy"),
            year: Some(2017),
            end_year: Some(2018),
            intensity: Some(Scalar::Text("high".into())),
            likelihood: Some(Scalar::Int(2)),
        },
        Doc {
            title: "Sanctions extended",
            country: Some("Iran"),
            region: Some("Western Asia"),
            topic: Some("oil"),
            sector: Some("Government"),
            year: Some(2016),
            end_year: Some(2018),
            intensity: Some(Scalar::Int(10)),
            likelihood: Some(Scalar::Int(4)),
        },
        Doc {
            title: "Untagged note",
            country: None,
            region: None,
            topic: None,
            sector: None,
            year: None,
            end_year: None,
            intensity: None,
            likelihood: None,
        },
    ]
    .iter()
    .map(Doc::event)
    .collect()
}

pub async fn store_with(events: Vec<Event>) -> Arc<MemoryStore> {
    let store = MemoryStore::with_events(events);
    store.create_indexes(&REQUIRED_INDEXES).await.unwrap();
    Arc::new(store)
}

pub fn app_with(store: Arc<dyn CollectionAccessor>, config: AppConfig) -> Router {
    router(AppState::new(store, config))
}

pub async fn app(events: Vec<Event>) -> Router {
    app_with(store_with(events).await, AppConfig::default())
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, headers, bytes)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let (status, _, bytes) = send(app, req).await;
    (status, bytes)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Json) {
    let (status, bytes) = get(app, uri).await;
    let json = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("{uri}: body is not JSON ({e}): {}", String::from_utf8_lossy(&bytes)));
    (status, json)
}

pub async fn post(app: &Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("build POST");
    let (status, _, bytes) = send(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Json::Null))
}
