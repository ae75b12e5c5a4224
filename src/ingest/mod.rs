// src/ingest/mod.rs
//! Ingestion: feeds deliver `NewArticle`s, the pipeline normalizes them,
//! upserts by URL and embeds whatever is new or changed.

pub mod feeds;
pub mod jobs;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::DynEmbeddingProvider;
use crate::ingest::jobs::{IngestJob, JobHistory, JobStatus};
use crate::ingest::types::ArticleFeed;
use crate::model::{ArticleId, NewArticle};
use crate::store::{ArticleStore, StoreError};

/// Snippets longer than this are cut and suffixed with "...".
pub const SNIPPET_MAX_CHARS: usize = 500;
pub const TITLE_MAX_CHARS: usize = 500;
pub const FULL_TEXT_MAX_CHARS: usize = 50_000;
pub const DEFAULT_EMBED_BATCH: usize = 32;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Scheduled ingest runs.");
        describe_counter!("ingest_articles_created_total", "Articles inserted by URL.");
        describe_counter!("ingest_articles_updated_total", "Articles updated in place by URL.");
        describe_counter!(
            "ingest_embeddings_written_total",
            "Article embeddings written to the store."
        );
        describe_counter!(
            "ingest_embed_skipped_total",
            "Articles left pending because the provider returned no vector."
        );
        describe_counter!("ingest_skipped_total", "Feed items dropped during normalization.");
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_counter!("ingest_feed_items_total", "Items delivered per feed.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// Normalize text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Cut to `max` chars and mark the cut with "...".
pub fn make_snippet(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut s: String = text.chars().take(max).collect();
    s.push_str("...");
    s
}

/// Clean a feed item; `None` when it lacks a title, url or body.
/// An empty snippet is derived from the body.
pub fn normalize_article(raw: NewArticle) -> Option<NewArticle> {
    let url = raw.url.trim().to_string();
    let title: String = normalize_text(&raw.title)
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect();
    let full_text: String = normalize_text(&raw.full_text)
        .chars()
        .take(FULL_TEXT_MAX_CHARS)
        .collect();
    if url.is_empty() || title.is_empty() || full_text.is_empty() {
        return None;
    }
    let snippet = match normalize_text(&raw.snippet) {
        s if s.is_empty() => make_snippet(&full_text, SNIPPET_MAX_CHARS),
        s => make_snippet(&s, SNIPPET_MAX_CHARS),
    };
    Some(NewArticle {
        source: raw.source,
        title,
        url,
        snippet,
        full_text,
        published_date: raw.published_date,
    })
}

/// Article waiting for a vector, with the content revision the text belongs to.
struct Pending {
    id: ArticleId,
    revision: u64,
    text: String,
}

/// Counts for one ingest or reindex pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    pub embedded: usize,
    pub embed_failed: usize,
    pub skipped: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.found += other.found;
        self.created += other.created;
        self.updated += other.updated;
        self.embedded += other.embedded;
        self.embed_failed += other.embed_failed;
        self.skipped += other.skipped;
    }
}

pub struct IngestPipeline {
    provider: DynEmbeddingProvider,
    store: Arc<dyn ArticleStore>,
    jobs: Arc<JobHistory>,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(
        provider: DynEmbeddingProvider,
        store: Arc<dyn ArticleStore>,
        jobs: Arc<JobHistory>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            provider,
            store,
            jobs,
            batch_size: DEFAULT_EMBED_BATCH,
        }
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }

    pub fn jobs(&self) -> &Arc<JobHistory> {
        &self.jobs
    }

    /// Upsert every valid article and embed the ones that need it.
    ///
    /// A provider failure leaves articles pending (they stay out of search).
    /// A vector of the wrong dimensionality is a configuration error and
    /// aborts the run.
    pub async fn ingest(&self, articles: Vec<NewArticle>) -> Result<IngestReport> {
        let mut report = IngestReport {
            found: articles.len(),
            ..IngestReport::default()
        };
        let mut to_embed: Vec<Pending> = Vec::new();

        for raw in articles {
            let Some(article) = normalize_article(raw) else {
                report.skipped += 1;
                continue;
            };
            let text = article.embedding_text();
            let outcome = match self.store.upsert(article).await {
                Ok(o) => o,
                Err(StoreError::InvalidArticle(reason)) => {
                    warn!(target: "ingest", %reason, "article rejected by store");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e).context("upserting article"),
            };
            if outcome.created {
                report.created += 1;
            } else {
                report.updated += 1;
            }
            if outcome.needs_embedding {
                // Same URL twice in one batch: embed the latest content only.
                let item = Pending {
                    id: outcome.id,
                    revision: outcome.revision,
                    text,
                };
                match to_embed.iter_mut().find(|p| p.id == outcome.id) {
                    Some(slot) => *slot = item,
                    None => to_embed.push(item),
                }
            }
        }

        self.embed_and_store(to_embed, &mut report).await?;

        counter!("ingest_articles_created_total").increment(report.created as u64);
        counter!("ingest_articles_updated_total").increment(report.updated as u64);
        counter!("ingest_skipped_total").increment(report.skipped as u64);
        Ok(report)
    }

    /// Embed up to `limit` articles that still have no vector.
    pub async fn reindex_pending(&self, limit: usize) -> Result<IngestReport> {
        let pending = self
            .store
            .pending_embeddings(limit)
            .await
            .context("listing pending embeddings")?;
        let mut report = IngestReport {
            found: pending.len(),
            ..IngestReport::default()
        };
        let items = pending
            .into_iter()
            .map(|a| Pending {
                text: a.embedding_text(),
                id: a.id,
                revision: a.revision,
            })
            .collect();
        self.embed_and_store(items, &mut report).await?;
        info!(
            target: "ingest",
            embedded = report.embedded,
            failed = report.embed_failed,
            "reindex pass"
        );
        Ok(report)
    }

    async fn embed_and_store(
        &self,
        items: Vec<Pending>,
        report: &mut IngestReport,
    ) -> Result<()> {
        for chunk in items.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();
            let vectors = self.provider.embed_batch(&texts).await;
            if vectors.len() != chunk.len() {
                report.embed_failed += chunk.len();
                counter!("ingest_embed_skipped_total").increment(chunk.len() as u64);
                continue;
            }
            for (item, vector) in chunk.iter().zip(vectors) {
                let id = item.id;
                if vector.is_empty() {
                    report.embed_failed += 1;
                    counter!("ingest_embed_skipped_total").increment(1);
                    continue;
                }
                match self.store.set_embedding(id, item.revision, vector).await {
                    Ok(()) => {
                        report.embedded += 1;
                        counter!("ingest_embeddings_written_total").increment(1);
                    }
                    Err(e @ StoreError::DimensionMismatch { .. }) => {
                        return Err(e).with_context(|| {
                            format!("provider {} disagrees with store", self.provider.name())
                        });
                    }
                    Err(e @ StoreError::Poisoned) => return Err(e.into()),
                    Err(StoreError::Stale { current, .. }) => {
                        // A newer upsert owns this article now; its own embed pass writes the vector.
                        debug!(target: "ingest", id, current, "embedding outdated before write, dropped");
                        report.embed_failed += 1;
                        counter!("ingest_embed_skipped_total").increment(1);
                    }
                    Err(e) => {
                        warn!(target: "ingest", id, error = %e, "embedding not stored");
                        report.embed_failed += 1;
                        counter!("ingest_embed_skipped_total").increment(1);
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetch one feed and ingest it, recording the run in the job history.
    pub async fn run_feed(&self, feed: &dyn ArticleFeed) -> IngestJob {
        let mut job = self.jobs.create(feed.name());
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.jobs.record(&job);

        let result = match feed.fetch_latest().await {
            Ok(articles) => self.ingest(articles).await,
            Err(e) => {
                counter!("ingest_feed_errors_total").increment(1);
                Err(e)
            }
        };

        job.completed_at = Some(Utc::now());
        match result {
            Ok(r) => {
                job.status = JobStatus::Completed;
                job.articles_found = r.found;
                job.articles_created = r.created;
                job.articles_updated = r.updated;
                job.embeddings_written = r.embedded;
                info!(
                    target: "ingest",
                    feed = feed.name(),
                    found = r.found,
                    created = r.created,
                    updated = r.updated,
                    embedded = r.embedded,
                    "feed ingested"
                );
            }
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(target: "ingest", feed = feed.name(), error = %msg, "feed failed");
                job.status = JobStatus::Failed;
                job.error = Some(msg);
            }
        }
        self.jobs.record(&job);
        job
    }

    /// Run every feed in order. One failing feed does not stop the others.
    pub async fn run_feeds(&self, feeds: &[Box<dyn ArticleFeed>]) -> Vec<IngestJob> {
        let mut out = Vec::with_capacity(feeds.len());
        for feed in feeds {
            out.push(self.run_feed(feed.as_ref()).await);
        }
        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        if let Ok(n) = self.store.count().await {
            gauge!("trends_store_articles").set(n as f64);
        }
        out
    }
}
