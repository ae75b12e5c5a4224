// tests/metrics.rs
#![cfg(feature = "strict-metrics")]

// Installs the global Prometheus recorder, so keep it behind the feature and
// in its own test binary.

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use trend_radar::embedding::DisabledProvider;
use trend_radar::metrics::Metrics;
use trend_radar::ranking::TrendRanker;
use trend_radar::store::InMemoryStore;

#[tokio::test]
async fn metrics_endpoint_exposes_search_series() {
    let metrics = Metrics::init().expect("recorder");
    assert!(std::ptr::eq(metrics, Metrics::init().unwrap()));

    // Disabled provider: every search fails open and is counted.
    let ranker = TrendRanker::new(
        Arc::new(DisabledProvider { dimension: 4 }),
        Arc::new(InMemoryStore::new(4)),
    );
    assert!(ranker.search("reels", 3).await.is_empty());

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "trends_search_total",
        "trends_search_fail_open_total",
        "empty_embedding",
        "trends_search_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}
