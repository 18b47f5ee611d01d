// src/store/mod.rs
//! Collection accessor seam: the primitive operations the query layer needs from
//! a document store. Handlers receive an `Arc<dyn CollectionAccessor>` built once
//! at start-up.

pub mod memory;

use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, Field};
use crate::query::pipeline::{Pipeline, Row};
use crate::query::predicate::Predicate;

pub use memory::MemoryStore;

/// Fields that must be indexed to keep filter/aggregation latency bounded.
pub const REQUIRED_INDEXES: [Field; 8] = [
    Field::PublishedYear,
    Field::Country,
    Field::Region,
    Field::Topic,
    Field::Sector,
    Field::Source,
    Field::Intensity,
    Field::Likelihood,
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persist failed: {0}")]
    Persist(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: Field,
    pub dir: SortDir,
}

/// Options for [`CollectionAccessor::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Vec<Field>>,
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
}

/// Lazy, forward-only sequence of matching documents.
///
/// Items are `Result`s so a backend can report a single bad document without
/// ending the iteration; consumers skip and log per-row failures.
pub struct Cursor {
    inner: Box<dyn Iterator<Item = Result<Event, StoreError>> + Send>,
}

impl Cursor {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Event, StoreError>> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn from_events(events: Vec<Event>) -> Self {
        Self::new(events.into_iter().map(Ok))
    }
}

impl Iterator for Cursor {
    type Item = Result<Event, StoreError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[async_trait::async_trait]
pub trait CollectionAccessor: Send + Sync {
    async fn find(&self, predicate: &Predicate, options: &FindOptions)
        -> Result<Cursor, StoreError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Row>, StoreError>;

    /// Distinct present values of `field` over the whole collection.
    async fn distinct(&self, field: Field) -> Result<Vec<Value>, StoreError>;

    /// Remove every document; returns how many were removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    async fn insert_many(&self, events: Vec<Event>) -> Result<u64, StoreError>;

    /// Offline maintenance: declare secondary indexes.
    async fn create_indexes(&self, fields: &[Field]) -> Result<(), StoreError>;
}
