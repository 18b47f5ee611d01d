// src/api.rs
//! HTTP surface. The route table is built explicitly from [`AppState`]; the
//! store is injected once at start-up and shared by every handler.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::admin;
use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::event::Field;
use crate::import;
use crate::metrics::{observe_store, record_request, Metrics};
use crate::query::export::{self, parse_fields, projection_for};
use crate::query::page::{self, Page, PageRequest};
use crate::query::recipes::{
    self, clamp_limit, KeyCount, ScatterPoint, SCATTER_DEFAULT, SCATTER_MAX, TOP_N_DEFAULT,
    TOP_N_MAX,
};
use crate::query::{compile, parse, Predicate};
use crate::store::{CollectionAccessor, FindOptions, StoreError};

/// Fields offered by `/meta/filters/`. The response object is keyed by field
/// name in alphabetical order.
pub const META_FIELDS: [Field; 10] = [
    Field::Region,
    Field::Country,
    Field::Topic,
    Field::Sector,
    Field::Source,
    Field::Pestle,
    Field::Swot,
    Field::City,
    Field::PublishedYear,
    Field::EndYear,
];

const YEAR_FIELDS: [Field; 3] = [Field::PublishedYear, Field::EndYear, Field::StartYear];

type Params = Query<HashMap<String, String>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CollectionAccessor>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn CollectionAccessor>, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Run one store call under the configured timeout. Elapsed timeouts and
    /// unavailable stores both become 503.
    async fn timed<T, F>(&self, op: &'static str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let out = tokio::time::timeout(self.config.store_timeout(), fut).await;
        observe_store(op, started.elapsed().as_secs_f64() * 1000.0);
        match out {
            Ok(res) => res.map_err(ApiError::from),
            Err(_) => Err(ApiError::StoreUnavailable(format!(
                "{op} timed out after {} ms",
                self.config.store_timeout_ms
            ))),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/events/", get(list_events))
        .route("/agg/count-by-country/", get(count_by_country))
        .route("/agg/count-by-sector/", get(count_by_sector))
        .route("/agg/top-topics/", get(top_topics))
        .route("/agg/topics-by-region/", get(topics_by_region))
        .route("/agg/avg-intensity-by-year/", get(avg_intensity_by_year))
        .route("/agg/count-by-year/", get(count_by_year))
        .route("/agg/scatter-intensity-likelihood/", get(scatter_intensity_likelihood))
        .route("/export/csv/", get(export_csv))
        .route("/meta/filters/", get(meta_filters))
        .route("/import/", post(import_events));

    let prefix = state.config.api_prefix.clone();
    let mut app = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&prefix, api)
    };
    app = app.route("/health", get(|| async { "ok" }));
    if state.config.admin_enabled {
        app = app.route("/admin/events/", get(admin_events));
    }

    let metrics_enabled = state.config.metrics_enabled;
    let mut app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    if metrics_enabled {
        match Metrics::init() {
            Ok(m) => app = app.merge(m.router()),
            Err(e) => warn!(target: "api", error = %e, "metrics disabled: recorder install failed"),
        }
    }
    app
}

fn predicate_from(params: &HashMap<String, String>) -> Predicate {
    let spec = parse(params);
    debug!(target: "api", filters = ?spec, "parsed filters");
    compile(&spec)
}

/// `[{<label>: key, count}]`
fn labelled(rows: Vec<KeyCount>, label: &str) -> Vec<Value> {
    rows.into_iter()
        .map(|r| {
            let mut m = Map::new();
            m.insert(label.to_string(), r.key);
            m.insert("count".to_string(), Value::from(r.count));
            Value::Object(m)
        })
        .collect()
}

async fn list_events(State(state): State<AppState>, Query(q): Params) -> ApiResult<Json<Page>> {
    record_request("events");
    let predicate = predicate_from(&q);
    let req = PageRequest::from_params(&q);
    let page = state
        .timed("page", page::page(state.store.as_ref(), &predicate, req))
        .await?;
    Ok(Json(page))
}

async fn count_by_country(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<Value>>> {
    record_request("count_by_country");
    let rows = state
        .timed(
            "aggregate",
            recipes::count_by(state.store.as_ref(), predicate_from(&q), Field::Country),
        )
        .await?;
    Ok(Json(labelled(rows, "country")))
}

async fn count_by_sector(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<Value>>> {
    record_request("count_by_sector");
    let rows = state
        .timed(
            "aggregate",
            recipes::count_by(state.store.as_ref(), predicate_from(&q), Field::Sector),
        )
        .await?;
    Ok(Json(labelled(rows, "sector")))
}

async fn top_topics(State(state): State<AppState>, Query(q): Params) -> ApiResult<Json<Vec<Value>>> {
    record_request("top_topics");
    let limit = clamp_limit(q.get("limit").map(String::as_str), TOP_N_DEFAULT, TOP_N_MAX);
    let rows = state
        .timed(
            "aggregate",
            recipes::top_n(state.store.as_ref(), predicate_from(&q), Field::Topic, limit),
        )
        .await?;
    Ok(Json(labelled(rows, "topic")))
}

async fn topics_by_region(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<Value>>> {
    record_request("topics_by_region");
    let groups = state
        .timed(
            "aggregate",
            recipes::nested_group(
                state.store.as_ref(),
                predicate_from(&q),
                Field::Region,
                Field::Topic,
            ),
        )
        .await?;
    Ok(Json(
        groups
            .into_iter()
            .map(|g| {
                json!({
                    "region": g.key,
                    "count": g.count,
                    "topics": labelled(g.items, "topic"),
                })
            })
            .collect(),
    ))
}

async fn avg_intensity_by_year(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<Value>>> {
    record_request("avg_intensity_by_year");
    let rows = state
        .timed(
            "aggregate",
            recipes::average_by(
                state.store.as_ref(),
                predicate_from(&q),
                Field::PublishedYear,
                Field::Intensity,
            ),
        )
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|r| json!({ "year": r.key, "avgIntensity": r.average, "count": r.count }))
            .collect(),
    ))
}

/// `group_by` picks the year field; anything unrecognised means `published_year`.
fn year_field(raw: Option<&str>) -> Field {
    raw.map(str::trim)
        .and_then(Field::from_name)
        .filter(|f| YEAR_FIELDS.contains(f))
        .unwrap_or(Field::PublishedYear)
}

async fn count_by_year(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<Value>>> {
    record_request("count_by_year");
    let field = year_field(q.get("group_by").map(String::as_str));
    let rows = state
        .timed(
            "aggregate",
            recipes::series(state.store.as_ref(), predicate_from(&q), field),
        )
        .await?;
    Ok(Json(labelled(rows, "year")))
}

async fn scatter_intensity_likelihood(
    State(state): State<AppState>,
    Query(q): Params,
) -> ApiResult<Json<Vec<ScatterPoint>>> {
    record_request("scatter_intensity_likelihood");
    let limit = clamp_limit(q.get("limit").map(String::as_str), SCATTER_DEFAULT, SCATTER_MAX);
    let points = state
        .timed(
            "find",
            recipes::scatter(state.store.as_ref(), predicate_from(&q), limit),
        )
        .await?;
    Ok(Json(points))
}

async fn export_csv(State(state): State<AppState>, Query(q): Params) -> ApiResult<Response> {
    record_request("export_csv");
    let columns = parse_fields(q.get("fields").map(String::as_str));
    let predicate = predicate_from(&q);
    let opts = FindOptions {
        projection: Some(projection_for(&columns)),
        ..FindOptions::default()
    };
    let cursor = state
        .timed("find", state.store.find(&predicate, &opts))
        .await?;

    let body = Body::from_stream(export::stream_csv(cursor, columns));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=export.csv"),
        ],
        body,
    )
        .into_response())
}

/// Blank values dropped; year fields coerced to integers and sorted
/// numerically, everything else sorted as text.
pub fn filter_options(field: Field, values: Vec<Value>) -> Vec<Value> {
    if YEAR_FIELDS.contains(&field) {
        let mut years: Vec<i64> = values.iter().filter_map(coerce_year).collect();
        years.sort_unstable();
        years.dedup();
        return years.into_iter().map(Value::from).collect();
    }
    let mut texts: Vec<String> = values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|s| !s.trim().is_empty())
        .collect();
    texts.sort();
    texts.dedup();
    texts.into_iter().map(Value::String).collect()
}

fn coerce_year(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

async fn meta_filters(
    State(state): State<AppState>,
) -> ApiResult<Json<BTreeMap<&'static str, Vec<Value>>>> {
    record_request("meta_filters");
    let mut out = BTreeMap::new();
    for field in META_FIELDS {
        let values = state
            .timed("distinct", state.store.distinct(field))
            .await?;
        out.insert(field.as_str(), filter_options(field, values));
    }
    Ok(Json(out))
}

/// Destructive: replaces the collection with the configured import file.
/// Not put under the store timeout; cancelling between the clear and the
/// insert would leave the collection empty.
async fn import_events(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<Value>)> {
    record_request("import");
    let report = import::import_file(state.store.as_ref(), &state.config.import_path).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "imported": report.imported })),
    ))
}

async fn admin_events(State(state): State<AppState>, Query(q): Params) -> ApiResult<Html<String>> {
    record_request("admin_events");
    let country = q.get("country").map(String::as_str);
    let rows = state
        .timed("find", admin::preview_rows(state.store.as_ref(), country))
        .await?;
    Ok(Html(admin::render_table(&rows, country)))
}
