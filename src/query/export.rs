// src/query/export.rs
//! CSV streaming exporter.
//!
//! Rows are written straight from the cursor into a bounded channel that backs
//! the HTTP body, so the export never holds the full result set. When the client
//! goes away the channel closes, the next write fails with `BrokenPipe`, and the
//! worker stops. No row cap is applied here (unlike the paginator).

use std::io::{self, Write};

use metrics::counter;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::event::{Event, Field};
use crate::store::{Cursor, StoreError};

/// Columns used when the request names none.
pub const DEFAULT_EXPORT_FIELDS: [&str; 10] = [
    "title",
    "country",
    "region",
    "topic",
    "sector",
    "published_year",
    "intensity",
    "likelihood",
    "relevance",
    "source",
];

const CHUNK_BYTES: usize = 16 * 1024;
const CHANNEL_CHUNKS: usize = 8;

/// Parse `?fields=a,b,c`. Order is kept; empty tokens are dropped; an empty
/// list means the defaults.
pub fn parse_fields(raw: Option<&str>) -> Vec<String> {
    let fields: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() {
        DEFAULT_EXPORT_FIELDS.iter().map(|f| f.to_string()).collect()
    } else {
        fields
    }
}

/// Store projection for the requested columns; unrecognised names are left out
/// (their cells are rendered empty).
pub fn projection_for(columns: &[String]) -> Vec<Field> {
    let mut out: Vec<Field> = columns.iter().filter_map(|c| Field::from_name(c)).collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub written: u64,
    pub skipped: u64,
}

/// Write the header (`columns` verbatim) and one row per document.
/// Missing values are empty cells. Unreadable documents are skipped.
pub fn write_csv<I, W>(rows: I, columns: &[String], out: W) -> Result<ExportReport, csv::Error>
where
    I: IntoIterator<Item = Result<Event, StoreError>>,
    W: Write,
{
    let resolved: Vec<Option<Field>> = columns.iter().map(|c| Field::from_name(c)).collect();
    let mut wtr = csv::WriterBuilder::new()
        .buffer_capacity(CHUNK_BYTES)
        .from_writer(out);
    wtr.write_record(columns)?;

    let mut report = ExportReport::default();
    let mut cells: Vec<String> = Vec::with_capacity(columns.len());
    for (i, item) in rows.into_iter().enumerate() {
        let doc = match item {
            Ok(doc) => doc,
            Err(e) => {
                warn!(target: "export", row = i, error = %e, "skipping unreadable document");
                report.skipped += 1;
                continue;
            }
        };
        cells.clear();
        cells.extend(
            resolved
                .iter()
                .map(|f| f.map(|f| doc.get(f).to_cell()).unwrap_or_default()),
        );
        wtr.write_record(&cells)?;
        report.written += 1;
    }
    wtr.flush()?;
    Ok(report)
}

/// `io::Write` adapter that forwards each buffer flush as one body chunk.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export client disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn is_disconnect(e: &csv::Error) -> bool {
    matches!(e.kind(), csv::ErrorKind::Io(io) if io.kind() == io::ErrorKind::BrokenPipe)
}

/// Start the export on a blocking worker and return the body stream.
pub fn stream_csv(cursor: Cursor, columns: Vec<String>) -> ReceiverStream<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CHUNKS);
    let err_tx = tx.clone();

    tokio::task::spawn_blocking(move || {
        match write_csv(cursor, &columns, ChannelWriter { tx }) {
            Ok(report) => {
                counter!("export_rows_total").increment(report.written);
                info!(
                    target: "export",
                    written = report.written,
                    skipped = report.skipped,
                    "csv export finished"
                );
            }
            Err(e) if is_disconnect(&e) => {
                debug!(target: "export", "csv export aborted: client disconnected");
            }
            Err(e) => {
                warn!(target: "export", error = %e, "csv export failed");
                let _ = err_tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    ReceiverStream::new(rx)
}
