// src/ranking.rs
//! Trend ranking service: topic text in, top-k `RankedSnippet`s out.
//!
//! The public search path never fails. Every way it can come up empty goes
//! through `fail_open`, which logs and counts the reason.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::config::RankingConfig;
use crate::embedding::DynEmbeddingProvider;
use crate::model::RankedSnippet;
use crate::scoring::{self, ScoringWeights};
use crate::store::{ArticleStore, Neighbor};

pub const DEFAULT_K: usize = crate::config::trends::DEFAULT_K;

/// Why a search returned nothing. Used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOpen {
    EmptyEmbedding,
    Store,
}

impl FailOpen {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailOpen::EmptyEmbedding => "empty_embedding",
            FailOpen::Store => "store_error",
        }
    }
}

#[derive(Clone)]
pub struct TrendRanker {
    provider: DynEmbeddingProvider,
    store: Arc<dyn ArticleStore>,
    weights: ScoringWeights,
    overfetch: usize,
    default_k: usize,
}

impl TrendRanker {
    pub fn new(provider: DynEmbeddingProvider, store: Arc<dyn ArticleStore>) -> Self {
        Self {
            provider,
            store,
            weights: ScoringWeights::default(),
            overfetch: crate::config::trends::DEFAULT_OVERFETCH,
            default_k: DEFAULT_K,
        }
    }

    pub fn from_config(
        provider: DynEmbeddingProvider,
        store: Arc<dyn ArticleStore>,
        cfg: &RankingConfig,
    ) -> Self {
        Self::new(provider, store)
            .with_weights(cfg.weights())
            .with_overfetch(cfg.overfetch)
            .with_default_k(cfg.default_k)
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Top `k` trend snippets for `topic`, best first. Empty on any failure.
    pub async fn search(&self, topic: &str, k: usize) -> Vec<RankedSnippet> {
        self.search_at(topic, k, Utc::now()).await
    }

    pub async fn search_default(&self, topic: &str) -> Vec<RankedSnippet> {
        self.search(topic, self.default_k).await
    }

    /// Same as `search` with the recency clock pinned to `now`.
    pub async fn search_at(&self, topic: &str, k: usize, now: DateTime<Utc>) -> Vec<RankedSnippet> {
        counter!("trends_search_total").increment(1);
        let t0 = Instant::now();
        let out = match self.try_search_at(topic, k, now).await {
            Ok(Some(hits)) => hits,
            Ok(None) => fail_open(FailOpen::EmptyEmbedding, topic, None),
            Err(e) => fail_open(FailOpen::Store, topic, Some(&e)),
        };
        histogram!("trends_search_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        out
    }

    pub async fn try_search(&self, topic: &str, k: usize) -> Result<Option<Vec<RankedSnippet>>> {
        self.try_search_at(topic, k, Utc::now()).await
    }

    /// Fallible search for diagnostics. `Ok(None)` means the topic could not
    /// be embedded; a blank topic or `k == 0` is `Ok(Some([]))`.
    pub async fn try_search_at(
        &self,
        topic: &str,
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RankedSnippet>>> {
        let topic = topic.trim();
        if k == 0 || topic.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let query = self.provider.embed(topic).await;
        if query.is_empty() {
            return Ok(None);
        }

        let limit = k.saturating_mul(self.overfetch);
        let neighbors = self
            .store
            .nearest(&query, limit)
            .await
            .context("nearest-neighbour lookup")?;

        let ranked = rank_neighbors(neighbors, k, self.weights, now);
        debug!(
            target: "trends",
            topic_id = %anon_hash(topic),
            k,
            returned = ranked.len(),
            "trend search"
        );
        Ok(Some(ranked))
    }

    /// Entry point for the content generator.
    pub async fn get_trend_snippets(&self, topic: &str, k: usize) -> Vec<RankedSnippet> {
        self.search(topic, k).await
    }
}

/// Score, stable-sort by viral score (descending) and keep the first `k`.
/// Candidates arrive in store order, which decides ties.
pub fn rank_neighbors(
    neighbors: Vec<Neighbor>,
    k: usize,
    weights: ScoringWeights,
    now: DateTime<Utc>,
) -> Vec<RankedSnippet> {
    let mut scored: Vec<RankedSnippet> = neighbors
        .into_iter()
        .map(|n| {
            let similarity = scoring::similarity(n.distance);
            let recency = n.article.recency_factor(now);
            RankedSnippet {
                title: n.article.title,
                url: n.article.url,
                source: n.article.source.label().to_string(),
                snippet: n.article.snippet,
                viral_score: weights.viral_score(similarity, recency),
                similarity,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.viral_score.total_cmp(&a.viral_score));
    scored.truncate(k);
    scored
}

fn fail_open(reason: FailOpen, topic: &str, err: Option<&anyhow::Error>) -> Vec<RankedSnippet> {
    counter!("trends_search_fail_open_total", "reason" => reason.as_str()).increment(1);
    match err {
        Some(e) => warn!(
            target: "trends",
            topic_id = %anon_hash(topic.trim()),
            reason = reason.as_str(),
            error = %format!("{e:#}"),
            "trend search failed open"
        ),
        None => warn!(
            target: "trends",
            topic_id = %anon_hash(topic.trim()),
            reason = reason.as_str(),
            "trend search failed open"
        ),
    }
    Vec::new()
}

/// Short SHA-256 prefix so topics can be correlated in logs without storing them.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
