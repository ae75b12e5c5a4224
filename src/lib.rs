// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod ranking;
pub mod scoring;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::config::TrendsConfig;
use crate::embedding::DynEmbeddingProvider;
use crate::ingest::feeds::JsonFeed;
use crate::ingest::jobs::JobHistory;
use crate::ingest::scheduler::{spawn_scheduler, IngestSchedulerCfg};
use crate::ingest::types::ArticleFeed;
use crate::ingest::IngestPipeline;
use crate::store::{ArticleStore, InMemoryStore};

pub use crate::api::router;
pub use crate::model::{NewArticle, RankedSnippet, TrendArticle, TrendSource};
pub use crate::ranking::TrendRanker;

/// Everything the service needs, wired from one config.
pub struct TrendService {
    pub config: TrendsConfig,
    pub provider: DynEmbeddingProvider,
    pub store: Arc<InMemoryStore>,
    pub jobs: Arc<JobHistory>,
    pub ranker: Arc<TrendRanker>,
    pub pipeline: Arc<IngestPipeline>,
}

impl TrendService {
    /// Build from config with the configured embedding provider.
    pub fn from_config(config: TrendsConfig) -> Result<Self> {
        let provider = embedding::build_provider(&config.embedding)?;
        Self::with_provider(config, provider)
    }

    /// Build with an injected provider. Fails when the provider and the store
    /// disagree on dimensionality, or a snapshot cannot be loaded.
    pub fn with_provider(config: TrendsConfig, provider: DynEmbeddingProvider) -> Result<Self> {
        let dim = config.embedding.dimension;
        let store = match &config.store.snapshot_path {
            Some(path) => InMemoryStore::open_or_new(path, dim, config.store.metric)
                .with_context(|| format!("opening store snapshot {}", path.display()))?,
            None => InMemoryStore::with_metric(dim, config.store.metric),
        };
        embedding::ensure_dimensions(provider.dimension(), store.dimension())?;

        let store = Arc::new(store);
        let dyn_store: Arc<dyn ArticleStore> = store.clone();
        let jobs = Arc::new(JobHistory::with_capacity(config.ingest.job_history));
        let ranker = Arc::new(TrendRanker::from_config(
            provider.clone(),
            dyn_store.clone(),
            &config.ranking,
        ));
        let pipeline = Arc::new(IngestPipeline::new(provider.clone(), dyn_store, jobs.clone()));

        info!(
            target: "trends",
            provider = provider.name(),
            dimension = dim,
            "trend service ready"
        );
        Ok(Self {
            config,
            provider,
            store,
            jobs,
            ranker,
            pipeline,
        })
    }

    /// HTTP routes (without `/metrics`).
    pub fn router(&self) -> Router {
        api::router(api::AppState {
            ranker: self.ranker.clone(),
            jobs: self.jobs.clone(),
        })
    }

    /// JSON feeds from the configured fixtures directory, if any.
    pub fn feeds(&self) -> Result<Vec<Box<dyn ArticleFeed>>> {
        let Some(dir) = &self.config.ingest.fixtures_dir else {
            return Ok(Vec::new());
        };
        Ok(JsonFeed::load_dir(dir)?
            .into_iter()
            .map(|f| Box::new(f) as Box<dyn ArticleFeed>)
            .collect())
    }

    /// Start periodic ingestion over `feeds`.
    pub fn spawn_ingest(&self, feeds: Vec<Box<dyn ArticleFeed>>) -> tokio::task::JoinHandle<()> {
        let cfg = IngestSchedulerCfg {
            interval_secs: self.config.ingest.interval_secs,
            snapshot_path: self.config.store.snapshot_path.clone(),
            ..IngestSchedulerCfg::default()
        };
        spawn_scheduler(cfg, self.pipeline.clone(), feeds, self.store.clone())
    }
}
