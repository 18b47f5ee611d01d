// src/admin.rs
//! Read-only HTML preview of the collection for operators (`GET /admin/events/`).

use std::fmt::Write as _;

use html_escape::encode_text;
use tracing::warn;

use crate::event::{Event, Field};
use crate::query::predicate::{Condition, Predicate};
use crate::store::{CollectionAccessor, FindOptions, SortDir, SortSpec, StoreError};

pub const PREVIEW_ROWS: usize = 500;
pub const INSIGHT_CHARS: usize = 200;

const COLUMNS: [Field; 9] = [
    Field::Title,
    Field::Country,
    Field::Region,
    Field::Topic,
    Field::Sector,
    Field::PublishedIso,
    Field::Intensity,
    Field::Likelihood,
    Field::Insight,
];

/// Shorten to `max` characters, appending `...` when something was cut.
pub fn shorten(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Newest documents first, optionally restricted to one country (exact match).
pub async fn preview_rows(
    store: &dyn CollectionAccessor,
    country: Option<&str>,
) -> Result<Vec<Event>, StoreError> {
    let predicate = match country.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => Predicate::field(Field::Country, Condition::OneOf([c.to_string()].into())),
        None => Predicate::always(),
    };
    let opts = FindOptions {
        projection: Some(COLUMNS.to_vec()),
        sort: Some(SortSpec {
            field: Field::PublishedIso,
            dir: SortDir::Desc,
        }),
        skip: 0,
        limit: Some(PREVIEW_ROWS),
    };
    let cursor = store.find(&predicate, &opts).await?;
    Ok(cursor
        .filter_map(|item| match item {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(target: "api", error = %e, "admin preview: skipping unreadable document");
                None
            }
        })
        .collect())
}

pub fn render_table(rows: &[Event], country: Option<&str>) -> String {
    let mut html = String::with_capacity(256 + rows.len() * 256);
    html.push_str("<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Events</title></head><body>\n");
    let _ = write!(html, "<h1>Events ({})</h1>\n", rows.len());
    if let Some(c) = country {
        let _ = write!(html, "<p>country: {}</p>\n", encode_text(c));
    }
    html.push_str("<table>\n<thead><tr>");
    for col in COLUMNS {
        let _ = write!(html, "<th>{}</th>", col.as_str());
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for doc in rows {
        html.push_str("<tr>");
        for col in COLUMNS {
            let mut cell = doc.get(col).to_cell();
            if col == Field::Insight {
                cell = shorten(&cell, INSIGHT_CHARS);
            }
            let _ = write!(html, "<td>{}</td>", encode_text(&cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body></html>\n");
    html
}
