// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod admin;
pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod import;
pub mod metrics;
pub mod query;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;

use crate::store::{CollectionAccessor, MemoryStore, REQUIRED_INDEXES};

/// Open the configured store (snapshot-backed when `data_path` is set) and make
/// sure the required indexes exist.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<MemoryStore>> {
    let store = match &config.data_path {
        Some(path) => MemoryStore::open(path)
            .with_context(|| format!("opening event snapshot {}", path.display()))?,
        None => MemoryStore::new(),
    };
    store
        .create_indexes(&REQUIRED_INDEXES)
        .await
        .context("creating required indexes")?;
    info!(target: "store", documents = store.len(), "store ready");
    Ok(Arc::new(store))
}

/// Build the full application router the same way the binary does.
pub async fn app(config: AppConfig) -> anyhow::Result<axum::Router> {
    let store = open_store(&config).await?;
    Ok(router(AppState::new(store, config)))
}

/// Install the global tracing subscriber. `LOG_FORMAT=json` switches to JSON
/// lines; `RUST_LOG` overrides the default filter. A no-op if a subscriber is
/// already set.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("event_analytics=info,tower_http=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}
