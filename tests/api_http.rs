// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /api/events/ (paging, filters, search, sort)
// - GET /api/agg/* response shapes
// - GET /api/meta/filters/
// - custom prefix, admin toggle

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{app, app_with, get, get_json, sample_events, store_with};
use event_analytics::event::{Event, Scalar};
use event_analytics::AppConfig;

#[tokio::test]
async fn health_returns_ok() {
    let app = app(Vec::new()).await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn events_default_page_is_newest_first() {
    let app = app(sample_events()).await;
    let (status, page) = get_json(&app, "/api/events/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 4);
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 50);

    let titles: Vec<&str> = page["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Oil output cut",
            "Gas prices rise",
            "Sanctions extended",
            "Untagged note"
        ]
    );
}

#[tokio::test]
async fn events_total_ignores_limit() {
    let app = app(sample_events()).await;
    let (_, page) = get_json(&app, "/api/events/?limit=1&page=2").await;
    assert_eq!(page["total"], 4);
    assert_eq!(page["results"].as_array().unwrap().len(), 1);
    assert_eq!(page["results"][0]["title"], "Gas prices rise");
}

#[tokio::test]
async fn events_bad_paging_falls_back_to_defaults() {
    let app = app(sample_events()).await;
    let (status, page) = get_json(&app, "/api/events/?page=abc&limit=-3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 50);
}

#[tokio::test]
async fn events_filters_and_search_combine() {
    let app = app(sample_events()).await;

    let (_, page) = get_json(&app, "/api/events/?country=India,Iran&year=2017").await;
    assert_eq!(page["total"], 2);

    let (_, page) = get_json(&app, "/api/events/?search=SANCTIONS").await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["results"][0]["country"], "Iran");

    // Membership is case-sensitive.
    let (_, page) = get_json(&app, "/api/events/?country=india").await;
    assert_eq!(page["total"], 0);

    // Unparsable filters are dropped, not rejected.
    let (status, page) = get_json(&app, "/api/events/?year=twenty&intensity_min=x").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 4);

    let (_, page) = get_json(&app, "/api/events/?intensity_min=7").await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn events_sort_and_order() {
    let app = app(sample_events()).await;
    let (_, page) = get_json(&app, "/api/events/?sort=published_year&order=asc&limit=1").await;
    // Missing values sort first ascending.
    assert_eq!(page["results"][0]["title"], "Untagged note");
}

#[tokio::test]
async fn count_by_country_shape() {
    let app = app(sample_events()).await;
    let (status, rows) = get_json(&app, "/api/agg/count-by-country/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        rows,
        json!([
            {"country": "India", "count": 2},
            {"country": "Iran", "count": 1}
        ])
    );
}

#[tokio::test]
async fn count_by_sector_respects_filters() {
    let app = app(sample_events()).await;
    let (_, rows) = get_json(&app, "/api/agg/count-by-sector/?country=India").await;
    assert_eq!(rows, json!([{"sector": "Energy", "count": 2}]));
}

#[tokio::test]
async fn topics_by_region_shape_and_unknown_label() {
    let mut events = sample_events();
    events.push(Event {
        title: Some("No topic".into()),
        region: Some("Western Asia".into()),
        ..Event::default()
    });
    let app = app(events).await;
    let (_, rows) = get_json(&app, "/api/agg/topics-by-region/").await;
    assert_eq!(
        rows,
        json!([
            {"region": "Unknown", "count": 1, "topics": []},
            {"region": "Southern Asia", "count": 2, "topics": [
                {"topic": "gas", "count": 1},
                {"topic": "oil", "count": 1}
            ]},
            {"region": "Western Asia", "count": 2, "topics": [
                {"topic": "oil", "count": 1}
            ]}
        ])
    );
}

#[tokio::test]
async fn avg_intensity_by_year_counts_non_numeric() {
    let app = app(sample_events()).await;
    let (_, rows) = get_json(&app, "/api/agg/avg-intensity-by-year/").await;
    assert_eq!(
        rows,
        json!([
            {"year": null, "avgIntensity": null, "count": 1},
            {"year": 2016, "avgIntensity": 10.0, "count": 1},
            {"year": 2017, "avgIntensity": 6.0, "count": 2}
        ])
    );
}

#[tokio::test]
async fn count_by_year_group_by() {
    let app = app(sample_events()).await;

    let (_, rows) = get_json(&app, "/api/agg/count-by-year/").await;
    assert_eq!(
        rows,
        json!([{"year": 2016, "count": 1}, {"year": 2017, "count": 2}])
    );

    let (_, rows) = get_json(&app, "/api/agg/count-by-year/?group_by=end_year").await;
    assert_eq!(
        rows,
        json!([{"year": 2018, "count": 2}, {"year": 2020, "count": 1}])
    );

    // Unknown grouping falls back to published_year.
    let (_, fallback) = get_json(&app, "/api/agg/count-by-year/?group_by=title").await;
    let (_, default) = get_json(&app, "/api/agg/count-by-year/").await;
    assert_eq!(fallback, default);
}

#[tokio::test]
async fn scatter_points_coerce_numbers() {
    let app = app(sample_events()).await;
    let (_, rows) = get_json(&app, "/api/agg/scatter-intensity-likelihood/?country=India").await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["intensity"], json!(6.0));
    assert_eq!(rows[0]["likelihood"], json!(3.0));
    assert_eq!(rows[0]["year"], 2017);
    assert_eq!(rows[0]["title"], "Oil output cut");
    assert!(rows[1]["intensity"].is_null(), "non-numeric intensity becomes null");
}

#[tokio::test]
async fn meta_filters_lists_sorted_options() {
    let mut events = sample_events();
    events.push(Event {
        country: Some(String::new()),
        end_year: Some(Scalar::Text("2015".into())),
        ..Event::default()
    });
    let app = app(events).await;
    let (status, meta) = get_json(&app, "/api/meta/filters/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["country"], json!(["India", "Iran"]));
    assert_eq!(meta["topic"], json!(["gas", "oil"]));
    assert_eq!(meta["published_year"], json!([2016, 2017]));
    assert_eq!(meta["end_year"], json!([2015, 2018, 2020]));
    assert_eq!(meta["pestle"], json!([]));
    assert_eq!(meta.as_object().unwrap().len(), 10);
}

#[tokio::test]
async fn meta_filters_keys_are_alphabetical() {
    let app = app(sample_events()).await;
    let (_, body) = get(&app, "/api/meta/filters/").await;
    let text = String::from_utf8(body).unwrap();
    let keys = [
        "city", "country", "end_year", "pestle", "published_year", "region", "sector",
        "source", "swot", "topic",
    ];
    let positions: Vec<usize> = keys
        .iter()
        .map(|k| text.find(&format!("\"{k}\":")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
}

#[tokio::test]
async fn custom_prefix_moves_the_api() {
    let store = store_with(sample_events()).await;
    let cfg = AppConfig {
        api_prefix: "/v1".into(),
        ..AppConfig::default()
    };
    let app = app_with(store, cfg);
    let (status, _) = get(&app, "/v1/agg/count-by-country/").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/api/agg/count-by-country/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_preview_escapes_and_can_be_disabled() {
    let mut events = sample_events();
    events.push(Event {
        title: Some("<b>bold</b>".into()),
        country: Some("India".into()),
        published_iso: Some("2030-01-01T00:00:00".into()),
        ..Event::default()
    });
    let store = store_with(events).await;

    let app = app_with(store.clone(), AppConfig::default());
    let (status, body) = get(&app, "/admin/events/?country=India").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));
    assert!(html.contains("Oil output cut"));
    assert!(!html.contains("Sanctions extended"), "country filter applies");

    let cfg = AppConfig {
        admin_enabled: false,
        ..AppConfig::default()
    };
    let app = app_with(store, cfg);
    let (status, _) = get(&app, "/admin/events/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
