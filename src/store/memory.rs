// src/store/memory.rs
//! In-process document collection.
//!
//! Readers take a cheap `Arc` snapshot under a short read lock and iterate it
//! without holding any lock. Writers are serialised by `write_gate` and swap in a
//! new snapshot; when a snapshot path is configured the collection is persisted as
//! a JSON array via temp file + rename.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use super::{CollectionAccessor, Cursor, FindOptions, SortDir, StoreError};
use crate::event::{Event, Field, FieldRef};
use crate::query::pipeline::{apply_stages, Pipeline, Row};
use crate::query::predicate::{Condition, Predicate};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IndexKey {
    Int(i64),
    Text(String),
}

impl IndexKey {
    fn of(v: FieldRef<'_>) -> Option<IndexKey> {
        match v {
            FieldRef::Int(i) => Some(IndexKey::Int(i)),
            FieldRef::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some(IndexKey::Int(f as i64))
            }
            FieldRef::Text(s) => Some(IndexKey::Text(s.to_string())),
            _ => None,
        }
    }
}

/// Exact-value postings; positions are ascending.
type ValueIndex = HashMap<IndexKey, Vec<usize>>;

#[derive(Debug, Clone, Default)]
struct Collection {
    docs: Vec<Arc<Event>>,
    indexes: BTreeMap<Field, ValueIndex>,
}

impl Collection {
    fn index_doc(&mut self, pos: usize) {
        let doc = Arc::clone(&self.docs[pos]);
        for (field, index) in self.indexes.iter_mut() {
            if let Some(key) = IndexKey::of(doc.get(*field)) {
                index.entry(key).or_default().push(pos);
            }
        }
    }

    fn rebuild_index(&mut self, field: Field) {
        let mut index = ValueIndex::new();
        for (pos, doc) in self.docs.iter().enumerate() {
            if let Some(key) = IndexKey::of(doc.get(field)) {
                index.entry(key).or_default().push(pos);
            }
        }
        self.indexes.insert(field, index);
    }

    fn postings(&self, field: Field, condition: &Condition) -> Option<Vec<usize>> {
        let index = self.indexes.get(&field)?;
        match condition {
            Condition::Equals(n) => Some(
                index
                    .get(&IndexKey::Int(*n))
                    .cloned()
                    .unwrap_or_default(),
            ),
            Condition::OneOf(values) => {
                let mut out: Vec<usize> = values
                    .iter()
                    .filter_map(|v| index.get(&IndexKey::Text(v.clone())))
                    .flatten()
                    .copied()
                    .collect();
                out.sort_unstable();
                out.dedup();
                Some(out)
            }
            _ => None,
        }
    }

    /// Narrowest posting list among indexed top-level equality/membership
    /// clauses, or `None` for a full scan. The full predicate is still applied.
    fn candidates(&self, predicate: &Predicate) -> Option<Vec<usize>> {
        let clauses: &[Predicate] = match predicate {
            Predicate::All(ps) => ps,
            p => std::slice::from_ref(p),
        };
        clauses
            .iter()
            .filter_map(|p| match p {
                Predicate::Field { field, condition } => self.postings(*field, condition),
                _ => None,
            })
            .min_by_key(Vec::len)
    }

    fn matching_positions(&self, predicate: &Predicate) -> Vec<usize> {
        match self.candidates(predicate) {
            Some(c) => c
                .into_iter()
                .filter(|&i| predicate.matches(&self.docs[i]))
                .collect(),
            None => (0..self.docs.len())
                .filter(|&i| predicate.matches(&self.docs[i]))
                .collect(),
        }
    }
}

pub struct MemoryStore {
    state: RwLock<Arc<Collection>>,
    write_gate: tokio::sync::Mutex<()>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Purely in-memory, empty collection.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(Collection::default())),
            write_gate: tokio::sync::Mutex::new(()),
            snapshot_path: None,
        }
    }

    /// In-memory collection pre-filled with `events` (no persistence).
    pub fn with_events(events: Vec<Event>) -> Self {
        let store = Self::new();
        *store.state.write() = Arc::new(Collection {
            docs: events.into_iter().map(Arc::new).collect(),
            indexes: BTreeMap::new(),
        });
        store
    }

    /// Collection backed by a JSON snapshot at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let docs: Vec<Event> = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };
        info!(target: "store", path = %path.display(), documents = docs.len(), "snapshot loaded");
        let mut store = Self::with_events(docs);
        store.snapshot_path = Some(path);
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.snapshot().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn indexed_fields(&self) -> Vec<Field> {
        self.snapshot().indexes.keys().copied().collect()
    }

    fn snapshot(&self) -> Arc<Collection> {
        Arc::clone(&self.state.read())
    }

    async fn persist(&self, coll: Arc<Collection>) -> Result<(), StoreError> {
        let Some(path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || write_snapshot(&path, &coll))
            .await
            .map_err(|e| StoreError::Persist(e.to_string()))?
    }
}

fn write_snapshot(path: &Path, coll: &Collection) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let docs: Vec<&Event> = coll.docs.iter().map(|d| d.as_ref()).collect();
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    serde_json::to_writer(&mut tmp, &docs)?;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| StoreError::Persist(e.error.to_string()))?;
    info!(target: "store", path = %path.display(), documents = docs.len(), "snapshot written");
    Ok(())
}

fn sort_positions(coll: &Collection, positions: &mut [usize], field: Field, dir: SortDir) {
    positions.sort_by(|&a, &b| {
        let ord = coll.docs[a].get(field).cmp_store(&coll.docs[b].get(field));
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

#[async_trait::async_trait]
impl CollectionAccessor for MemoryStore {
    async fn find(
        &self,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Cursor, StoreError> {
        let coll = self.snapshot();
        let projection = options.projection.clone();
        let limit = options.limit.unwrap_or(usize::MAX);

        let positions: Box<dyn Iterator<Item = usize> + Send> = match options.sort {
            Some(sort) => {
                let mut matched = coll.matching_positions(predicate);
                sort_positions(&coll, &mut matched, sort.field, sort.dir);
                Box::new(matched.into_iter())
            }
            None => {
                // lazy: the predicate is evaluated as the cursor advances
                let scan_coll = Arc::clone(&coll);
                let pred = predicate.clone();
                let source: Box<dyn Iterator<Item = usize> + Send> =
                    match coll.candidates(predicate) {
                        Some(c) => Box::new(c.into_iter()),
                        None => Box::new(0..coll.docs.len()),
                    };
                Box::new(source.filter(move |&i| pred.matches(&scan_coll.docs[i])))
            }
        };

        debug!(target: "store", skip = options.skip, limit = ?options.limit, "find");
        let docs = Arc::clone(&coll);
        let iter = positions
            .skip(options.skip)
            .take(limit)
            .map(move |i| {
                let doc = &docs.docs[i];
                Ok(match &projection {
                    Some(fields) => doc.project(fields),
                    None => doc.as_ref().clone(),
                })
            });
        Ok(Cursor::new(iter))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let coll = self.snapshot();
        Ok(coll.matching_positions(predicate).len() as u64)
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Row>, StoreError> {
        let coll = self.snapshot();
        let rows: Vec<Row> = coll
            .matching_positions(&pipeline.predicate)
            .into_iter()
            .map(|i| coll.docs[i].to_row())
            .collect();
        debug!(target: "store", matched = rows.len(), stages = pipeline.stages.len(), "aggregate");
        Ok(apply_stages(rows, &pipeline.stages))
    }

    async fn distinct(&self, field: Field) -> Result<Vec<Value>, StoreError> {
        let coll = self.snapshot();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for doc in &coll.docs {
            let v = doc.get(field);
            if v.is_missing() {
                continue;
            }
            let json = v.to_json();
            if seen.insert(json.to_string()) {
                out.push(json);
            }
        }
        Ok(out)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let _gate = self.write_gate.lock().await;
        let current = self.snapshot();
        let removed = current.docs.len() as u64;
        let mut next = Collection::default();
        for field in current.indexes.keys() {
            next.indexes.insert(*field, ValueIndex::new());
        }
        let next = Arc::new(next);
        // disk first: a failed write leaves the visible collection untouched
        self.persist(Arc::clone(&next)).await?;
        *self.state.write() = next;
        info!(target: "store", removed, "collection cleared");
        Ok(removed)
    }

    async fn insert_many(&self, events: Vec<Event>) -> Result<u64, StoreError> {
        let _gate = self.write_gate.lock().await;
        let inserted = events.len() as u64;
        let mut coll = self.snapshot().as_ref().clone();
        for ev in events {
            coll.docs.push(Arc::new(ev));
            coll.index_doc(coll.docs.len() - 1);
        }
        let next = Arc::new(coll);
        self.persist(Arc::clone(&next)).await?;
        *self.state.write() = next;
        info!(target: "store", inserted, "documents inserted");
        Ok(inserted)
    }

    async fn create_indexes(&self, fields: &[Field]) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut guard = self.state.write();
        let mut coll = guard.as_ref().clone();
        for field in fields {
            coll.rebuild_index(*field);
        }
        *guard = Arc::new(coll);
        info!(target: "store", fields = ?fields, "indexes created");
        Ok(())
    }
}
