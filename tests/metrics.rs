// tests/metrics.rs
//
// Prometheus exposition: `/metrics` is mounted only when enabled and reports
// request, export and import series.

mod common;

use axum::http::StatusCode;

use common::{app_with, get, sample_events, store_with};
use event_analytics::AppConfig;

#[tokio::test(flavor = "multi_thread")]
async fn metrics_endpoint_contains_expected_series() {
    let cfg = AppConfig {
        metrics_enabled: true,
        ..AppConfig::default()
    };
    let app = app_with(store_with(sample_events()).await, cfg);

    let (status, _) = get(&app, "/api/events/").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/api/agg/count-by-country/").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    for needle in [
        "api_requests_total",
        "endpoint=\"events\"",
        "endpoint=\"count_by_country\"",
        "store_operation_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}

#[tokio::test]
async fn metrics_disabled_by_default() {
    let app = app_with(store_with(sample_events()).await, AppConfig::default());
    let (status, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
