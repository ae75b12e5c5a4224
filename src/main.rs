//! Trend Radar service: binary entrypoint.
//! Boots the Axum HTTP server, the ingest scheduler and the metrics endpoint.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_radar::config::TrendsConfig;
use trend_radar::metrics::Metrics;
use trend_radar::TrendService;

/// Local tracing subscriber for development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - TRENDS_DEV_LOG=1
/// `TRENDS_LOG_JSON=1` switches to JSON lines.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("TRENDS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trends=info,embedding=info,ingest=info,store=info,warn"));

    let json = std::env::var("TRENDS_LOG_JSON").ok().is_some_and(|v| v == "1");
    // The runtime may already have installed a subscriber.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let metrics = Metrics::init()?;
    let config = TrendsConfig::load_default()?;
    let service = TrendService::from_config(config)?;

    let feeds = service.feeds()?;
    if feeds.is_empty() {
        tracing::info!(target: "ingest", "no feeds configured, scheduler not started");
    } else {
        service.spawn_ingest(feeds);
    }

    let router = service.router().merge(metrics.router());
    Ok(router.into())
}
