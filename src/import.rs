// src/import.rs
//! Bulk import: replace the whole collection with the records of a JSON array
//! file. Clear-then-insert is two store calls, so readers may briefly see an
//! empty collection while an import runs.

use std::path::{Path, PathBuf};

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::event::Event;
use crate::store::{CollectionAccessor, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            e @ ImportError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ImportError::Malformed(msg) => ApiError::BadImport(msg),
            ImportError::Store(se) => se.into(),
            e @ ImportError::Read { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub removed: u64,
    pub imported: u64,
    pub skipped: u64,
}

/// Turn raw dataset records into events. Non-object entries are skipped.
pub fn transform(records: &[Value]) -> (Vec<Event>, u64) {
    let mut skipped = 0;
    let events = records
        .iter()
        .enumerate()
        .filter_map(|(i, rec)| match rec.as_object() {
            Some(obj) => Some(Event::ingest(obj)),
            None => {
                warn!(target: "import", index = i, "skipping non-object record");
                skipped += 1;
                None
            }
        })
        .collect();
    (events, skipped)
}

/// Parse an import payload: must be a JSON array.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<Value>, ImportError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ImportError::Malformed(format!("invalid JSON: {e}")))?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ImportError::Malformed(
            "import file must contain a JSON array".into(),
        )),
    }
}

pub async fn import_file(
    store: &dyn CollectionAccessor,
    path: &Path,
) -> Result<ImportReport, ImportError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ImportError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ImportError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let records = parse_records(&bytes)?;
    let (events, skipped) = transform(&records);

    let removed = store.delete_all().await?;
    let imported = store.insert_many(events).await?;
    counter!("import_documents_total").increment(imported);

    info!(
        target: "import",
        path = %path.display(),
        removed,
        imported,
        skipped,
        "collection replaced"
    );
    Ok(ImportReport {
        removed,
        imported,
        skipped,
    })
}
