// src/query/predicate.rs
//! Predicate compiler: `FilterSpec` -> store predicate.
//!
//! Every accepted filter shape is one variant of [`Condition`]; the compiler is a
//! single exhaustive walk over the `FilterSpec`, so no client string can turn into an
//! operator. Membership is exact (case-sensitive) string equality, while the
//! free-text search is a case-insensitive substring match. Both are part of the
//! contract.

use std::collections::BTreeSet;

use crate::event::{Event, Field, FieldRef};
use crate::query::spec::FilterSpec;

/// Fields the free-text search looks at.
pub const SEARCH_FIELDS: [Field; 2] = [Field::Title, Field::Insight];

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Numeric equality (integers and integral floats both match).
    Equals(i64),
    /// Exact string equality against one of the listed values.
    OneOf(BTreeSet<String>),
    /// Inclusive numeric bounds; either side optional. Non-numeric values never match.
    Range { min: Option<i64>, max: Option<i64> },
    /// Case-insensitive substring on text values.
    ContainsCI(String),
}

impl Condition {
    pub fn matches(&self, value: FieldRef<'_>) -> bool {
        match self {
            Condition::Equals(n) => value.as_f64().is_some_and(|x| x == *n as f64),
            Condition::OneOf(set) => value.as_text().is_some_and(|s| set.contains(s)),
            Condition::Range { min, max } => match value.as_f64() {
                Some(x) => {
                    min.map_or(true, |lo| x >= lo as f64) && max.map_or(true, |hi| x <= hi as f64)
                }
                None => false,
            },
            Condition::ContainsCI(needle) => value
                .as_text()
                .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Conjunction; an empty list matches every document.
    All(Vec<Predicate>),
    /// Disjunction; an empty list matches nothing.
    Any(Vec<Predicate>),
    Field { field: Field, condition: Condition },
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn field(field: Field, condition: Condition) -> Self {
        Predicate::Field { field, condition }
    }

    pub fn matches(&self, ev: &Event) -> bool {
        match self {
            Predicate::All(ps) => ps.iter().all(|p| p.matches(ev)),
            Predicate::Any(ps) => ps.iter().any(|p| p.matches(ev)),
            Predicate::Field { field, condition } => condition.matches(ev.get(*field)),
        }
    }

    /// AND an extra clause onto this predicate, flattening top-level conjunctions.
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::All(mut ps) => {
                ps.push(other);
                Predicate::All(ps)
            }
            p => Predicate::All(vec![p, other]),
        }
    }
}

/// Compile a parsed filter spec. Pure and deterministic: field clauses come out in
/// `Field` order, followed by the search disjunction when present.
pub fn compile(spec: &FilterSpec) -> Predicate {
    let mut clauses: Vec<Predicate> = spec
        .conditions()
        .map(|(field, condition)| Predicate::field(field, condition.clone()))
        .collect();

    if let Some(text) = spec.search() {
        clauses.push(Predicate::Any(
            SEARCH_FIELDS
                .iter()
                .map(|f| Predicate::field(*f, Condition::ContainsCI(text.to_string())))
                .collect(),
        ));
    }

    Predicate::All(clauses)
}
