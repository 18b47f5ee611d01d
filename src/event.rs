//! # Event documents
//!
//! The store holds one flat collection of loosely-typed "event" records (news and
//! research items tagged with region, country, topic, sector and numeric scores).
//! This module models them as a closed set of named optional fields:
//!
//! - [`Field`] enumerates every recognised field; nothing else reaches the query layer.
//! - [`Scalar`] keeps numeric-ish values as they arrived (integer, float or text),
//!   so a non-numeric `intensity` can be excluded from averages instead of coerced.
//! - [`Event::ingest`] derives `published_iso` / `published_year` exactly once,
//!   at import time. Reads never recompute them.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Every field the service knows about. Query parameters, projections, sort keys
/// and grouping keys are all expressed through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Insight,
    Url,
    Region,
    Country,
    City,
    Topic,
    Sector,
    Source,
    Pestle,
    Swot,
    Impact,
    Intensity,
    Likelihood,
    Relevance,
    StartYear,
    EndYear,
    Published,
    Added,
    PublishedIso,
    PublishedYear,
}

impl Field {
    pub const ALL: [Field; 21] = [
        Field::Title,
        Field::Insight,
        Field::Url,
        Field::Region,
        Field::Country,
        Field::City,
        Field::Topic,
        Field::Sector,
        Field::Source,
        Field::Pestle,
        Field::Swot,
        Field::Impact,
        Field::Intensity,
        Field::Likelihood,
        Field::Relevance,
        Field::StartYear,
        Field::EndYear,
        Field::Published,
        Field::Added,
        Field::PublishedIso,
        Field::PublishedYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Insight => "insight",
            Field::Url => "url",
            Field::Region => "region",
            Field::Country => "country",
            Field::City => "city",
            Field::Topic => "topic",
            Field::Sector => "sector",
            Field::Source => "source",
            Field::Pestle => "pestle",
            Field::Swot => "swot",
            Field::Impact => "impact",
            Field::Intensity => "intensity",
            Field::Likelihood => "likelihood",
            Field::Relevance => "relevance",
            Field::StartYear => "start_year",
            Field::EndYear => "end_year",
            Field::Published => "published",
            Field::Added => "added",
            Field::PublishedIso => "published_iso",
            Field::PublishedYear => "published_year",
        }
    }

    /// Exact, case-sensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loosely-typed scalar as stored in the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Map a raw JSON value. With `coerce_digits`, non-empty all-digit strings
    /// become integers. Nulls, booleans, arrays and objects are dropped.
    fn from_raw(v: &Value, coerce_digits: bool) -> Option<Scalar> {
        match v {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            Value::String(s) => {
                if coerce_digits && !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(i) = s.parse::<i64>() {
                        return Some(Scalar::Int(i));
                    }
                }
                Some(Scalar::Text(s.clone()))
            }
            _ => None,
        }
    }

    fn as_ref(&self) -> FieldRef<'_> {
        match self {
            Scalar::Int(i) => FieldRef::Int(*i),
            Scalar::Float(f) => FieldRef::Float(*f),
            Scalar::Text(s) => FieldRef::Text(s),
        }
    }
}

/// Borrowed view of one field of one document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Missing,
    Int(i64),
    Float(f64),
    Text(&'a str),
}

impl<'a> FieldRef<'a> {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldRef::Int(i) => Some(i as f64),
            FieldRef::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            FieldRef::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldRef::Missing)
    }

    pub fn to_json(&self) -> Value {
        match *self {
            FieldRef::Missing => Value::Null,
            FieldRef::Int(i) => Value::from(i),
            FieldRef::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldRef::Text(s) => Value::String(s.to_string()),
        }
    }

    /// Rendering used by the CSV exporter: missing values become an empty cell.
    pub fn to_cell(&self) -> String {
        match *self {
            FieldRef::Missing => String::new(),
            FieldRef::Int(i) => i.to_string(),
            FieldRef::Float(f) => f.to_string(),
            FieldRef::Text(s) => s.to_string(),
        }
    }

    /// Store ordering: missing < numbers < text. Numbers compare by value
    /// regardless of integer/float representation.
    pub fn cmp_store(&self, other: &FieldRef<'_>) -> Ordering {
        fn rank(v: &FieldRef<'_>) -> u8 {
            match v {
                FieldRef::Missing => 0,
                FieldRef::Int(_) | FieldRef::Float(_) => 1,
                FieldRef::Text(_) => 2,
            }
        }
        match (self, other) {
            (FieldRef::Text(a), FieldRef::Text(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => rank(a).cmp(&rank(b)),
            },
        }
    }
}

/// One stored event document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pestle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_iso: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i64>,
}

fn text_ref(v: &Option<String>) -> FieldRef<'_> {
    v.as_deref().map(FieldRef::Text).unwrap_or(FieldRef::Missing)
}

fn scalar_ref(v: &Option<Scalar>) -> FieldRef<'_> {
    v.as_ref().map(Scalar::as_ref).unwrap_or(FieldRef::Missing)
}

fn raw_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Event {
    /// Build a stored document from one raw import record.
    ///
    /// Unknown keys are dropped. `intensity`, `likelihood` and `relevance` given as
    /// digit strings become integers; `published` is parsed leniently and, when it
    /// parses, fills `published_iso` and `published_year`.
    pub fn ingest(raw: &Map<String, Value>) -> Event {
        let text = |f: Field| raw_text(raw.get(f.as_str()));
        let scalar = |f: Field, coerce: bool| {
            raw.get(f.as_str())
                .and_then(|v| Scalar::from_raw(v, coerce))
        };

        let published = text(Field::Published);
        let (published_iso, published_year) = match published.as_deref().and_then(parse_published) {
            Some(p) => (Some(p.iso), Some(p.year)),
            None => (None, None),
        };

        Event {
            title: text(Field::Title),
            insight: text(Field::Insight),
            url: text(Field::Url),
            region: text(Field::Region),
            country: text(Field::Country),
            city: text(Field::City),
            topic: text(Field::Topic),
            sector: text(Field::Sector),
            source: text(Field::Source),
            pestle: text(Field::Pestle),
            swot: text(Field::Swot),
            impact: text(Field::Impact),
            intensity: scalar(Field::Intensity, true),
            likelihood: scalar(Field::Likelihood, true),
            relevance: scalar(Field::Relevance, true),
            start_year: scalar(Field::StartYear, false),
            end_year: scalar(Field::EndYear, false),
            published,
            added: text(Field::Added),
            published_iso,
            published_year,
        }
    }

    pub fn get(&self, field: Field) -> FieldRef<'_> {
        match field {
            Field::Title => text_ref(&self.title),
            Field::Insight => text_ref(&self.insight),
            Field::Url => text_ref(&self.url),
            Field::Region => text_ref(&self.region),
            Field::Country => text_ref(&self.country),
            Field::City => text_ref(&self.city),
            Field::Topic => text_ref(&self.topic),
            Field::Sector => text_ref(&self.sector),
            Field::Source => text_ref(&self.source),
            Field::Pestle => text_ref(&self.pestle),
            Field::Swot => text_ref(&self.swot),
            Field::Impact => text_ref(&self.impact),
            Field::Intensity => scalar_ref(&self.intensity),
            Field::Likelihood => scalar_ref(&self.likelihood),
            Field::Relevance => scalar_ref(&self.relevance),
            Field::StartYear => scalar_ref(&self.start_year),
            Field::EndYear => scalar_ref(&self.end_year),
            Field::Published => text_ref(&self.published),
            Field::Added => text_ref(&self.added),
            Field::PublishedIso => text_ref(&self.published_iso),
            Field::PublishedYear => self
                .published_year
                .map(FieldRef::Int)
                .unwrap_or(FieldRef::Missing),
        }
    }

    /// New document holding only `fields`; the source is left untouched.
    pub fn project(&self, fields: &[Field]) -> Event {
        let mut out = Event::default();
        for f in fields {
            match f {
                Field::Title => out.title = self.title.clone(),
                Field::Insight => out.insight = self.insight.clone(),
                Field::Url => out.url = self.url.clone(),
                Field::Region => out.region = self.region.clone(),
                Field::Country => out.country = self.country.clone(),
                Field::City => out.city = self.city.clone(),
                Field::Topic => out.topic = self.topic.clone(),
                Field::Sector => out.sector = self.sector.clone(),
                Field::Source => out.source = self.source.clone(),
                Field::Pestle => out.pestle = self.pestle.clone(),
                Field::Swot => out.swot = self.swot.clone(),
                Field::Impact => out.impact = self.impact.clone(),
                Field::Intensity => out.intensity = self.intensity.clone(),
                Field::Likelihood => out.likelihood = self.likelihood.clone(),
                Field::Relevance => out.relevance = self.relevance.clone(),
                Field::StartYear => out.start_year = self.start_year.clone(),
                Field::EndYear => out.end_year = self.end_year.clone(),
                Field::Published => out.published = self.published.clone(),
                Field::Added => out.added = self.added.clone(),
                Field::PublishedIso => out.published_iso = self.published_iso.clone(),
                Field::PublishedYear => out.published_year = self.published_year,
            }
        }
        out
    }

    /// JSON row of every present field, keyed by wire name.
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        for f in Field::ALL {
            let v = self.get(f);
            if !v.is_missing() {
                row.insert(f.as_str().to_string(), v.to_json());
            }
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDate {
    pub iso: String,
    pub year: i64,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%B %d %Y %H:%M:%S",
    "%b %d %Y %H:%M:%S",
    "%d %B %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%m/%d/%Y",
];

static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").expect("ordinal regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Lenient parse of the raw `published` string into an ISO-8601 timestamp and year.
/// Returns `None` when no known layout matches.
pub fn parse_published(raw: &str) -> Option<PublishedDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(PublishedDate {
            iso: dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            year: i64::from(chrono::Datelike::year(&dt)),
        });
    }

    // "January, 20 2017 03:51:25" / "20th Jan 2017" -> "January 20 2017 03:51:25" / "20 Jan 2017"
    let cleaned = trimmed.replace(',', " ");
    let cleaned = RE_ORDINAL.replace_all(&cleaned, "$1");
    let cleaned = RE_WS.replace_all(cleaned.trim(), " ").to_string();

    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&cleaned, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some(PublishedDate {
        iso: naive.format("%Y-%m-%dT%H:%M:%S").to_string(),
        year: i64::from(chrono::Datelike::year(&naive)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object fixture")
    }

    #[test]
    fn ingest_derives_published_fields_once() {
        let ev = Event::ingest(&raw(json!({
            "title": "Oil output",
            "published": "January, 20 2017 03:51:25",
        })));
        assert_eq!(ev.published_iso.as_deref(), Some("2017-01-20T03:51:25"));
        assert_eq!(ev.published_year, Some(2017));
        assert_eq!(ev.published.as_deref(), Some("January, 20 2017 03:51:25"));
    }

    #[test]
    fn published_layouts() {
        let p = parse_published("2016-09-11").unwrap();
        assert_eq!(p.iso, "2016-09-11T00:00:00");
        assert_eq!(p.year, 2016);

        let p = parse_published("2018-03-01T10:00:00+02:00").unwrap();
        assert_eq!(p.iso, "2018-03-01T10:00:00+02:00");
        assert_eq!(p.year, 2018);

        let p = parse_published("21st March 2019").unwrap();
        assert_eq!(p.iso, "2019-03-21T00:00:00");

        assert!(parse_published("").is_none());
        assert!(parse_published("sometime soon").is_none());
    }

    #[test]
    fn unparsable_published_leaves_derived_fields_empty() {
        let ev = Event::ingest(&raw(json!({ "published": "not a date" })));
        assert_eq!(ev.published.as_deref(), Some("not a date"));
        assert!(ev.published_iso.is_none());
        assert!(ev.published_year.is_none());
    }

    #[test]
    fn digit_strings_become_integers_for_scores_only() {
        let ev = Event::ingest(&raw(json!({
            "intensity": "6",
            "likelihood": "",
            "relevance": 2,
            "end_year": "2030",
            "start_year": "",
        })));
        assert_eq!(ev.intensity, Some(Scalar::Int(6)));
        assert_eq!(ev.likelihood, Some(Scalar::Text(String::new())));
        assert_eq!(ev.relevance, Some(Scalar::Int(2)));
        // year fields are kept as they came
        assert_eq!(ev.end_year, Some(Scalar::Text("2030".into())));
        assert_eq!(ev.start_year, Some(Scalar::Text(String::new())));
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let ev = Event::ingest(&raw(json!({ "title": "t", "$where": "1 == 1", "extra": 5 })));
        let row = ev.to_row();
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("title"), Some(&json!("t")));
    }

    #[test]
    fn projection_is_a_new_record() {
        let ev = Event {
            title: Some("a".into()),
            country: Some("India".into()),
            intensity: Some(Scalar::Int(3)),
            ..Event::default()
        };
        let p = ev.project(&[Field::Country, Field::Intensity]);
        assert!(p.title.is_none());
        assert_eq!(p.country.as_deref(), Some("India"));
        assert_eq!(ev.title.as_deref(), Some("a"));
    }

    #[test]
    fn store_ordering_puts_missing_first_and_text_last() {
        let mut vals = vec![
            FieldRef::Text("b"),
            FieldRef::Int(3),
            FieldRef::Missing,
            FieldRef::Float(2.5),
            FieldRef::Text("a"),
        ];
        vals.sort_by(|a, b| a.cmp_store(b));
        assert_eq!(
            vals,
            vec![
                FieldRef::Missing,
                FieldRef::Float(2.5),
                FieldRef::Int(3),
                FieldRef::Text("a"),
                FieldRef::Text("b"),
            ]
        );
    }

    #[test]
    fn field_names_round_trip() {
        for f in Field::ALL {
            assert_eq!(Field::from_name(f.as_str()), Some(f));
        }
        assert_eq!(Field::from_name("Country"), None);
    }
}
