// src/query/recipes.rs
//! # Aggregation recipe library
//!
//! A fixed set of named aggregation shapes. Each recipe compiles to a
//! [`Pipeline`] (compiled predicate + row stages) that the store executes, and
//! the functions below shape the raw rows into typed results.
//!
//! Ordering contracts:
//! - count/top-N sort by count descending with the key ascending as a tie-break,
//!   so equal-count groups come back in the same order on every call;
//! - top-N truncates only after the full sort;
//! - nested groups keep a null outer key (as `"Unknown"`) but drop null inner keys;
//! - averages count every document but average only numeric metric values.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::event::{Field, Scalar};
use crate::query::pipeline::{is_blank, Accumulator, Pipeline, Row, Stage};
use crate::query::predicate::Predicate;
use crate::store::{CollectionAccessor, FindOptions, SortDir, StoreError};

pub const TOP_N_DEFAULT: usize = 10;
pub const TOP_N_MAX: usize = 100;
pub const SCATTER_DEFAULT: usize = 2000;
pub const SCATTER_MAX: usize = 5000;

/// Label for a null/empty outer key in nested groups.
pub const UNKNOWN_LABEL: &str = "Unknown";

const COUNT: &str = "count";
const AVERAGE: &str = "average";
const ITEMS: &str = "items";

/// Client-supplied limit: unparsable or < 1 -> `default`, above `max` -> `max`.
/// Digit strings too large for `i64` count as "very large" and are capped.
pub fn clamp_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    let Some(s) = raw.map(str::trim) else {
        return default.min(max);
    };
    let requested = match s.parse::<i64>() {
        Ok(n) if n >= 1 => usize::try_from(n).unwrap_or(usize::MAX),
        Ok(_) => default,
        Err(_) if is_huge_number(s) => usize::MAX,
        Err(_) => default,
    };
    requested.min(max)
}

fn is_huge_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) && s.bytes().any(|b| b != b'0')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipe {
    /// Documents per value of `field`, most frequent first, blank keys dropped.
    CountBy(Field),
    /// `CountBy` truncated to `limit` rows after sorting.
    TopN { field: Field, limit: usize },
    /// Documents per value of `field`, ascending by key (time series).
    Series(Field),
    /// Count per (`outer`, `inner`) pair, regrouped by `outer`.
    Nested { outer: Field, inner: Field },
    /// Per-group mean of numeric `metric` values plus document count.
    AverageBy { group: Field, metric: Field },
}

impl Recipe {
    pub fn pipeline(&self, predicate: Predicate) -> Pipeline {
        let count_group = |field: Field| Stage::Group {
            keys: vec![field.as_str()],
            accumulators: vec![(COUNT, Accumulator::Count)],
        };
        let by_count = |field: Field| {
            Stage::Sort(vec![(COUNT, SortDir::Desc), (field.as_str(), SortDir::Asc)])
        };

        let stages = match *self {
            Recipe::CountBy(field) => vec![
                count_group(field),
                Stage::DropBlank(field.as_str()),
                by_count(field),
            ],
            Recipe::TopN { field, limit } => vec![
                count_group(field),
                Stage::DropBlank(field.as_str()),
                by_count(field),
                Stage::Limit(limit),
            ],
            Recipe::Series(field) => vec![
                count_group(field),
                Stage::DropBlank(field.as_str()),
                Stage::Sort(vec![(field.as_str(), SortDir::Asc)]),
            ],
            Recipe::Nested { outer, inner } => vec![
                Stage::Group {
                    keys: vec![outer.as_str(), inner.as_str()],
                    accumulators: vec![(COUNT, Accumulator::Count)],
                },
                Stage::Group {
                    keys: vec![outer.as_str()],
                    accumulators: vec![
                        (COUNT, Accumulator::Sum(COUNT)),
                        (ITEMS, Accumulator::Push(vec![inner.as_str(), COUNT])),
                    ],
                },
                Stage::Sort(vec![(outer.as_str(), SortDir::Asc)]),
            ],
            Recipe::AverageBy { group, metric } => vec![
                Stage::Group {
                    keys: vec![group.as_str()],
                    accumulators: vec![
                        (AVERAGE, Accumulator::AvgNumeric(metric.as_str())),
                        (COUNT, Accumulator::Count),
                    ],
                },
                Stage::Sort(vec![(group.as_str(), SortDir::Asc)]),
            ],
        };

        Pipeline { predicate, stages }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyCount {
    pub key: Value,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedGroup {
    pub key: String,
    /// Documents in the outer group, including those with a blank inner key.
    pub count: u64,
    pub items: Vec<KeyCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAverage {
    pub key: Value,
    pub average: Option<f64>,
    pub count: u64,
}

fn count_of(row: &Row) -> u64 {
    row.get(COUNT).and_then(Value::as_u64).unwrap_or(0)
}

fn key_counts(rows: Vec<Row>, field: Field) -> Vec<KeyCount> {
    rows.into_iter()
        .map(|mut r| KeyCount {
            count: count_of(&r),
            key: r.remove(field.as_str()).unwrap_or(Value::Null),
        })
        .collect()
}

pub async fn count_by(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    field: Field,
) -> Result<Vec<KeyCount>, StoreError> {
    let rows = store
        .aggregate(&Recipe::CountBy(field).pipeline(predicate))
        .await?;
    Ok(key_counts(rows, field))
}

pub async fn top_n(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    field: Field,
    limit: usize,
) -> Result<Vec<KeyCount>, StoreError> {
    let rows = store
        .aggregate(&Recipe::TopN { field, limit }.pipeline(predicate))
        .await?;
    Ok(key_counts(rows, field))
}

pub async fn series(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    field: Field,
) -> Result<Vec<KeyCount>, StoreError> {
    let rows = store
        .aggregate(&Recipe::Series(field).pipeline(predicate))
        .await?;
    Ok(key_counts(rows, field))
}

fn outer_label(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => UNKNOWN_LABEL.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNKNOWN_LABEL.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub async fn nested_group(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    outer: Field,
    inner: Field,
) -> Result<Vec<NestedGroup>, StoreError> {
    let rows = store
        .aggregate(&Recipe::Nested { outer, inner }.pipeline(predicate))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut items: Vec<KeyCount> = match row.get(ITEMS) {
                Some(Value::Array(entries)) => entries
                    .iter()
                    .filter_map(Value::as_object)
                    .filter(|e| !is_blank(e.get(inner.as_str())))
                    .map(|e| KeyCount {
                        key: e.get(inner.as_str()).cloned().unwrap_or(Value::Null),
                        count: count_of(e),
                    })
                    .collect(),
                _ => Vec::new(),
            };
            items.sort_by(|a, b| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| crate::query::pipeline::compare_json(&a.key, &b.key))
            });
            NestedGroup {
                key: outer_label(row.get(outer.as_str())),
                count: count_of(&row),
                items,
            }
        })
        .collect())
}

pub async fn average_by(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    group: Field,
    metric: Field,
) -> Result<Vec<GroupAverage>, StoreError> {
    let rows = store
        .aggregate(&Recipe::AverageBy { group, metric }.pipeline(predicate))
        .await?;
    Ok(rows
        .into_iter()
        .map(|mut r| GroupAverage {
            average: r.get(AVERAGE).and_then(Value::as_f64),
            count: count_of(&r),
            key: r.remove(group.as_str()).unwrap_or(Value::Null),
        })
        .collect())
}

/// One plotted point. `intensity`/`likelihood` are `None` when not numeric, so
/// the row survives even if it can't be placed on an axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub intensity: Option<f64>,
    pub likelihood: Option<f64>,
    pub relevance: Option<Scalar>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub topic: Option<String>,
    pub year: Option<i64>,
    pub title: Option<String>,
}

pub const SCATTER_FIELDS: [Field; 8] = [
    Field::Intensity,
    Field::Likelihood,
    Field::Relevance,
    Field::Country,
    Field::Region,
    Field::Topic,
    Field::PublishedYear,
    Field::Title,
];

pub fn coerce_f64(v: Option<&Scalar>) -> Option<f64> {
    match v? {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f).filter(|f| f.is_finite()),
        Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
    }
}

/// Projection recipe: no grouping, at most `limit` points (`limit` is clamped
/// to [`SCATTER_MAX`]).
pub async fn scatter(
    store: &dyn CollectionAccessor,
    predicate: Predicate,
    limit: usize,
) -> Result<Vec<ScatterPoint>, StoreError> {
    let opts = FindOptions {
        projection: Some(SCATTER_FIELDS.to_vec()),
        limit: Some(limit.min(SCATTER_MAX)),
        ..FindOptions::default()
    };
    let cursor = store.find(&predicate, &opts).await?;

    let mut points = Vec::new();
    for (i, item) in cursor.enumerate() {
        let doc = match item {
            Ok(doc) => doc,
            Err(e) => {
                warn!(target: "store", row = i, error = %e, "scatter: skipping unreadable document");
                continue;
            }
        };
        points.push(ScatterPoint {
            intensity: coerce_f64(doc.intensity.as_ref()),
            likelihood: coerce_f64(doc.likelihood.as_ref()),
            relevance: doc.relevance,
            country: doc.country,
            region: doc.region,
            topic: doc.topic,
            year: doc.published_year,
            title: doc.title,
        });
    }
    Ok(points)
}
