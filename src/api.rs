use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::jobs::{IngestJob, JobHistory};
use crate::model::RankedSnippet;
use crate::ranking::TrendRanker;

/// Upper bound on `k` accepted over HTTP.
pub const MAX_K: usize = 50;
const DEFAULT_JOBS_SHOWN: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub ranker: Arc<TrendRanker>,
    pub jobs: Arc<JobHistory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trends", get(trends))
        .route("/debug/ingest-jobs", get(debug_ingest_jobs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct TrendsQuery {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    k: Option<usize>,
}

// Never errors: a missing topic or any backend failure yields `[]`.
async fn trends(
    State(state): State<AppState>,
    Query(q): Query<TrendsQuery>,
) -> Json<Vec<RankedSnippet>> {
    let Some(topic) = q.topic else {
        return Json(Vec::new());
    };
    let k = q.k.unwrap_or(state.ranker.default_k()).min(MAX_K);
    Json(state.ranker.get_trend_snippets(&topic, k).await)
}

#[derive(serde::Deserialize)]
struct JobsQuery {
    #[serde(default)]
    n: Option<usize>,
}

async fn debug_ingest_jobs(
    State(state): State<AppState>,
    Query(q): Query<JobsQuery>,
) -> Json<Vec<IngestJob>> {
    let n = q.n.unwrap_or(DEFAULT_JOBS_SHOWN);
    let mut jobs = state.jobs.snapshot_last_n(n);
    jobs.reverse();
    Json(jobs)
}
