//! Offline import: replace the snapshot collection with a JSON array file and
//! (re)create the required indexes.
//!
//! Usage: `import_events [path]` (defaults to the configured import path).

use std::path::PathBuf;

use anyhow::{bail, Context};
use event_analytics::{import, open_store, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    event_analytics::init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    if config.data_path.is_none() {
        bail!("EVENTS_DATA_PATH (or data_path in the config file) must be set for an offline import");
    }
    let source = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.import_path.clone());

    let store = open_store(&config).await?;
    let report = import::import_file(store.as_ref(), &source)
        .await
        .with_context(|| format!("importing {}", source.display()))?;

    println!(
        "imported {} documents ({} replaced, {} skipped) from {}",
        report.imported,
        report.removed,
        report.skipped,
        source.display()
    );
    Ok(())
}
