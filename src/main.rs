//! Event analytics service entrypoint.
//! Loads configuration, opens the event store and serves the Axum router.

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;

use event_analytics::{app, init_tracing, AppConfig};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    let router = app(config).await?;
    info!(target: "api", "router ready");

    Ok(router.into())
}
