// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Safe to call more than once (tests build
    /// several routers); later calls reuse the first handle.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                describe_counter!("api_requests_total", "HTTP requests per endpoint");
                describe_counter!("export_rows_total", "Rows written by CSV exports");
                describe_counter!("import_documents_total", "Documents inserted by imports");
                describe_histogram!("store_operation_ms", "Store call latency in milliseconds");
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

pub fn record_request(endpoint: &'static str) {
    counter!("api_requests_total", "endpoint" => endpoint).increment(1);
}

pub fn observe_store(op: &'static str, elapsed_ms: f64) {
    histogram!("store_operation_ms", "op" => op).record(elapsed_ms);
}
