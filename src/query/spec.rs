// src/query/spec.rs
//! Query-parameter filter parser: raw params -> typed `FilterSpec`.
//!
//! `parse` turns untrusted query parameters into a typed [`FilterSpec`]. It is
//! total: malformed numbers drop only the bound they belong to, blank values
//! drop only their own field, and unrecognised parameter names are ignored.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::event::Field;
use crate::query::predicate::Condition;

/// Parameters filtered by set membership (`?country=India,Iran`).
pub const MEMBERSHIP_FIELDS: [Field; 8] = [
    Field::Region,
    Field::Country,
    Field::Topic,
    Field::Sector,
    Field::Source,
    Field::Pestle,
    Field::Swot,
    Field::City,
];

/// Fields accepting `{field}_min` / `{field}_max` integer bounds.
pub const RANGE_FIELDS: [Field; 4] = [
    Field::Intensity,
    Field::Likelihood,
    Field::Relevance,
    Field::EndYear,
];

pub const PARAM_YEAR: &str = "year";
pub const PARAM_SEARCH: &str = "search";

/// Typed, validated filters for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    conditions: BTreeMap<Field, Condition>,
    search: Option<String>,
}

impl FilterSpec {
    /// Field conditions in `Field` order.
    pub fn conditions(&self) -> impl Iterator<Item = (Field, &Condition)> + '_ {
        self.conditions.iter().map(|(f, c)| (*f, c))
    }

    pub fn get(&self, field: Field) -> Option<&Condition> {
        self.conditions.get(&field)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.search.is_none()
    }

    /// Builder used by callers that filter on a single field outside the
    /// query-string path (e.g. the admin preview).
    pub fn with(mut self, field: Field, condition: Condition) -> Self {
        self.conditions.insert(field, condition);
        self
    }
}

fn non_blank<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_int(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    non_blank(params, key).and_then(|v| v.parse::<i64>().ok())
}

/// Split a comma list, trimming tokens and dropping empty ones.
pub fn split_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse(params: &HashMap<String, String>) -> FilterSpec {
    let mut spec = FilterSpec::default();

    for field in MEMBERSHIP_FIELDS {
        if let Some(raw) = non_blank(params, field.as_str()) {
            let values = split_list(raw);
            if !values.is_empty() {
                spec.conditions.insert(field, Condition::OneOf(values));
            }
        }
    }

    if let Some(year) = parse_int(params, PARAM_YEAR) {
        spec.conditions
            .insert(Field::PublishedYear, Condition::Equals(year));
    }

    for field in RANGE_FIELDS {
        let min = parse_int(params, &format!("{}_min", field.as_str()));
        let max = parse_int(params, &format!("{}_max", field.as_str()));
        if min.is_some() || max.is_some() {
            spec.conditions.insert(field, Condition::Range { min, max });
        }
    }

    if let Some(text) = non_blank(params, PARAM_SEARCH) {
        spec.search = Some(text.to_string());
    }

    spec
}
