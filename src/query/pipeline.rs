// src/query/pipeline.rs
//! Aggregation pipelines: a compiled predicate followed by row stages.
//!
//! Columns are `&'static str` names chosen by recipe code (document fields via
//! [`Field::as_str`](crate::event::Field::as_str) or fixed output names), so
//! nothing client-supplied is ever used as a column reference.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::query::predicate::Predicate;
use crate::store::SortDir;

/// One aggregation output row (or one document, before the first stage).
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Number of input rows in the group.
    Count,
    /// Sum of a numeric column; non-numeric values are skipped.
    Sum(&'static str),
    /// Mean over rows where the column is a JSON number; `null` when there are none.
    AvgNumeric(&'static str),
    /// Collect `{col: value, ...}` objects, in input order.
    Push(Vec<&'static str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Group by the tuple of `keys` (missing keys group as `null`). Output rows
    /// carry the key columns plus one column per accumulator, in first-seen order.
    Group {
        keys: Vec<&'static str>,
        accumulators: Vec<(&'static str, Accumulator)>,
    },
    /// Remove rows whose column is null, missing or whitespace-only text.
    DropBlank(&'static str),
    /// Stable multi-key sort.
    Sort(Vec<(&'static str, SortDir)>),
    Limit(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub predicate: Predicate,
    pub stages: Vec<Stage>,
}

pub fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Store ordering for JSON values: null < numbers < strings < everything else.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

enum AccState {
    Count(u64),
    Sum { int: i64, float: f64, all_int: bool },
    Avg { sum: f64, n: u64 },
    Push(Vec<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => AccState::Count(0),
            Accumulator::Sum(_) => AccState::Sum {
                int: 0,
                float: 0.0,
                all_int: true,
            },
            Accumulator::AvgNumeric(_) => AccState::Avg { sum: 0.0, n: 0 },
            Accumulator::Push(_) => AccState::Push(Vec::new()),
        }
    }

    fn feed(&mut self, acc: &Accumulator, row: &Row) {
        match (self, acc) {
            (AccState::Count(c), _) => *c += 1,
            (AccState::Sum { int, float, all_int }, Accumulator::Sum(col)) => {
                if let Some(Value::Number(n)) = row.get(*col) {
                    match n.as_i64() {
                        Some(i) => *int = int.saturating_add(i),
                        None => {
                            *all_int = false;
                            *float += n.as_f64().unwrap_or(0.0);
                        }
                    }
                }
            }
            (AccState::Avg { sum, n }, Accumulator::AvgNumeric(col)) => {
                if let Some(Value::Number(x)) = row.get(*col) {
                    if let Some(x) = x.as_f64() {
                        *sum += x;
                        *n += 1;
                    }
                }
            }
            (AccState::Push(items), Accumulator::Push(cols)) => {
                let mut obj = Map::new();
                for c in cols {
                    obj.insert(
                        (*c).to_string(),
                        row.get(*c).cloned().unwrap_or(Value::Null),
                    );
                }
                items.push(Value::Object(obj));
            }
            _ => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Count(c) => Value::from(c),
            AccState::Sum {
                int,
                float,
                all_int,
            } => {
                if all_int {
                    Value::from(int)
                } else {
                    serde_json::Number::from_f64(int as f64 + float)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            AccState::Avg { sum, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    serde_json::Number::from_f64(sum / n as f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            AccState::Push(items) => Value::Array(items),
        }
    }
}

/// Integral floats group with the equal integer (`2030.0` with `2030`).
fn numeric_slot(v: &Value) -> Value {
    match v {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| Value::from(f as i64))
            .unwrap_or_else(|| v.clone()),
        other => other.clone(),
    }
}

fn group(
    rows: Vec<Row>,
    keys: &[&'static str],
    accumulators: &[(&'static str, Accumulator)],
) -> Vec<Row> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<AccState>)> = Vec::new();

    for row in &rows {
        let key: Vec<Value> = keys
            .iter()
            .map(|k| row.get(*k).cloned().unwrap_or(Value::Null))
            .collect();
        let slot_key = Value::Array(key.iter().map(numeric_slot).collect()).to_string();
        let idx = *slots.entry(slot_key).or_insert_with(|| {
            groups.push((
                key,
                accumulators.iter().map(|(_, a)| AccState::new(a)).collect(),
            ));
            groups.len() - 1
        });
        let (_, states) = &mut groups[idx];
        for (state, (_, acc)) in states.iter_mut().zip(accumulators) {
            state.feed(acc, row);
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Row::new();
            for (name, value) in keys.iter().zip(key) {
                out.insert((*name).to_string(), value);
            }
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert((*name).to_string(), state.finish());
            }
            out
        })
        .collect()
}

fn sort_rows(rows: &mut [Row], keys: &[(&'static str, SortDir)]) {
    rows.sort_by(|a, b| {
        for (col, dir) in keys {
            let va = a.get(*col).unwrap_or(&Value::Null);
            let vb = b.get(*col).unwrap_or(&Value::Null);
            let ord = compare_json(va, vb);
            if ord != Ordering::Equal {
                return match dir {
                    SortDir::Asc => ord,
                    SortDir::Desc => ord.reverse(),
                };
            }
        }
        Ordering::Equal
    });
}

/// Run `stages` over already-matched rows. Used by in-process stores.
pub fn apply_stages(mut rows: Vec<Row>, stages: &[Stage]) -> Vec<Row> {
    for stage in stages {
        rows = match stage {
            Stage::Group { keys, accumulators } => group(rows, keys, accumulators),
            Stage::DropBlank(col) => rows
                .into_iter()
                .filter(|r| !is_blank(r.get(*col)))
                .collect(),
            Stage::Sort(keys) => {
                sort_rows(&mut rows, keys);
                rows
            }
            Stage::Limit(n) => {
                rows.truncate(*n);
                rows
            }
        };
    }
    rows
}
