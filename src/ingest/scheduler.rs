// src/ingest/scheduler.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::ingest::types::ArticleFeed;
use crate::ingest::IngestPipeline;
use crate::store::InMemoryStore;

#[derive(Clone, Debug)]
pub struct IngestSchedulerCfg {
    pub interval_secs: u64,
    /// Pending articles re-tried per tick (provider outages leave some behind).
    pub reindex_limit: usize,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for IngestSchedulerCfg {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 3600,
            reindex_limit: 256,
            snapshot_path: None,
        }
    }
}

/// Run all feeds on a fixed interval (first tick immediately), retry pending
/// embeddings, then snapshot the store when a path is configured.
pub fn spawn_scheduler(
    cfg: IngestSchedulerCfg,
    pipeline: Arc<IngestPipeline>,
    feeds: Vec<Box<dyn ArticleFeed>>,
    store: Arc<InMemoryStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        loop {
            ticker.tick().await;
            run_tick(&cfg, &pipeline, &feeds, &store).await;
        }
    })
}

async fn run_tick(
    cfg: &IngestSchedulerCfg,
    pipeline: &IngestPipeline,
    feeds: &[Box<dyn ArticleFeed>],
    store: &Arc<InMemoryStore>,
) {
    let jobs = pipeline.run_feeds(feeds).await;
    let failed = jobs
        .iter()
        .filter(|j| j.status == crate::ingest::jobs::JobStatus::Failed)
        .count();

    if cfg.reindex_limit > 0 {
        if let Err(e) = pipeline.reindex_pending(cfg.reindex_limit).await {
            tracing::error!(target: "ingest", error = %format!("{e:#}"), "reindex failed");
        }
    }

    if let Some(path) = &cfg.snapshot_path {
        if let Err(e) = Arc::clone(store).persist(path.clone()).await {
            tracing::warn!(target: "ingest", error = %e, "snapshot failed");
        }
    }

    tracing::info!(
        target: "ingest",
        feeds = feeds.len(),
        failed,
        "ingest tick"
    );
}
