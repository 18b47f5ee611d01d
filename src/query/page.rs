// src/query/page.rs
//! Result paginator for `/events/`.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::event::{Event, Field};
use crate::query::predicate::Predicate;
use crate::query::recipes::clamp_limit;
use crate::store::{CollectionAccessor, FindOptions, SortDir, SortSpec, StoreError};

pub const PAGE_DEFAULT: usize = 1;
pub const LIMIT_DEFAULT: usize = 50;
pub const LIMIT_MAX: usize = 1000;

pub const DEFAULT_SORT: SortSpec = SortSpec {
    field: Field::PublishedIso,
    dir: SortDir::Desc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
    pub sort: SortSpec,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: PAGE_DEFAULT,
            limit: LIMIT_DEFAULT,
            sort: DEFAULT_SORT,
        }
    }
}

impl PageRequest {
    /// Read `page`, `limit`, `sort`, `order`. Anything invalid falls back to the
    /// default for that parameter; `limit` is capped at [`LIMIT_MAX`].
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let page = params
            .get("page")
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .and_then(|p| usize::try_from(p).ok())
            .unwrap_or(PAGE_DEFAULT);
        let limit = clamp_limit(params.get("limit").map(String::as_str), LIMIT_DEFAULT, LIMIT_MAX);

        let field = params
            .get("sort")
            .and_then(|s| Field::from_name(s.trim()))
            .unwrap_or(DEFAULT_SORT.field);
        let dir = match params.get("order").map(|o| o.trim().to_ascii_lowercase()) {
            Some(o) if o == "asc" => SortDir::Asc,
            Some(o) if o == "desc" => SortDir::Desc,
            _ => DEFAULT_SORT.dir,
        };

        Self {
            page,
            limit,
            sort: SortSpec { field, dir },
        }
    }

    pub fn skip(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// One page of events. `total` counts the whole matching set, not `results`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub results: Vec<Event>,
}

pub async fn page(
    store: &dyn CollectionAccessor,
    predicate: &Predicate,
    req: PageRequest,
) -> Result<Page, StoreError> {
    let limit = req.limit.clamp(1, LIMIT_MAX);
    let total = store.count(predicate).await?;

    let opts = FindOptions {
        projection: None,
        sort: Some(req.sort),
        skip: req.skip(),
        limit: Some(limit),
    };
    let cursor = store.find(predicate, &opts).await?;

    let mut results = Vec::with_capacity(limit.min(total as usize));
    for (i, item) in cursor.enumerate() {
        match item {
            Ok(doc) => results.push(doc),
            Err(e) => warn!(target: "store", row = i, error = %e, "page: skipping unreadable document"),
        }
    }
    results.truncate(limit);

    Ok(Page {
        total,
        page: req.page,
        limit,
        results,
    })
}
