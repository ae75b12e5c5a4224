use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Repeated calls return the
    /// same handle, so tests and the binary can both ask for it.
    pub fn init() -> Result<&'static Metrics> {
        static GLOBAL: OnceCell<Metrics> = OnceCell::new();
        GLOBAL.get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("prometheus: install recorder")?;
            describe_all();
            Ok(Metrics { handle })
        })
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

    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn describe_all() {
    describe_counter!("trends_search_total", "Trend searches served.");
    describe_counter!(
        "trends_search_fail_open_total",
        "Trend searches that returned nothing because of a failure, by reason."
    );
    describe_histogram!("trends_search_ms", "Trend search latency in milliseconds.");
    describe_counter!("trends_embed_requests_total", "Embedding requests by provider.");
    describe_counter!(
        "trends_embed_failures_total",
        "Embedding failures by provider and reason."
    );
    describe_histogram!("trends_embed_ms", "Embedding request latency in milliseconds.");
    describe_gauge!("trends_store_articles", "Articles held by the store.");
    crate::ingest::ensure_metrics_described();
}
