//! In-memory article store with brute-force nearest-neighbour search and
//! optional JSON snapshots.
//!
//! Articles live in a `BTreeMap` keyed by id, so scans run in insertion order
//! and the stable distance sort keeps that order for ties. All mutations take
//! the write lock, which serializes concurrent upserts of the same URL.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use metrics::gauge;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ArticleStore, Neighbor, StoreError, StoreResult, UpsertOutcome};
use crate::model::{ArticleId, NewArticle, TrendArticle};
use crate::scoring::{is_zero_vector, DistanceMetric};

#[derive(Debug, Default)]
struct Inner {
    last_id: ArticleId,
    articles: BTreeMap<ArticleId, TrendArticle>,
    by_url: HashMap<String, ArticleId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    articles: Vec<TrendArticle>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    dimension: usize,
    metric: DistanceMetric,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self::with_metric(dimension, DistanceMetric::Euclidean)
    }

    pub fn with_metric(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Write all articles to `path` as JSON (tmp file + rename).
    pub fn save_snapshot(&self, path: &Path) -> StoreResult<()> {
        let snapshot = {
            let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
            Snapshot {
                dimension: self.dimension,
                articles: g.articles.values().cloned().collect(),
            }
        };
        let json = serde_json::to_string(&snapshot).map_err(|e| StoreError::Snapshot(e.to_string()))?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StoreError::Snapshot(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            fs::rename(&tmp, path)
        };
        write().map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        debug!(target: "store", path = %path.display(), n = snapshot.articles.len(), "snapshot saved");
        Ok(())
    }

    /// `save_snapshot` on the blocking pool, for callers running on the runtime.
    pub async fn persist(self: Arc<Self>, path: PathBuf) -> StoreResult<()> {
        tokio::task::spawn_blocking(move || self.save_snapshot(&path))
            .await
            .map_err(|e| StoreError::Snapshot(format!("snapshot task: {e}")))?
    }

    /// Load a snapshot written by `save_snapshot`. A snapshot indexed at a
    /// different dimensionality is refused.
    pub fn load_snapshot(path: &Path, metric: DistanceMetric) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| StoreError::Snapshot(e.to_string()))?;

        let mut inner = Inner::default();
        for article in snapshot.articles {
            if let Some(e) = &article.embedding {
                if e.len() != snapshot.dimension {
                    return Err(StoreError::DimensionMismatch {
                        expected: snapshot.dimension,
                        actual: e.len(),
                    });
                }
            }
            inner.last_id = inner.last_id.max(article.id);
            inner.by_url.insert(article.url.clone(), article.id);
            inner.articles.insert(article.id, article);
        }
        info!(target: "store", path = %path.display(), n = inner.articles.len(), "snapshot loaded");

        Ok(Self {
            dimension: snapshot.dimension,
            metric,
            inner: RwLock::new(inner),
        })
    }

    /// Load `path` when it exists, otherwise start empty. Dimension must match.
    pub fn open_or_new(path: &Path, dimension: usize, metric: DistanceMetric) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::with_metric(dimension, metric));
        }
        let store = Self::load_snapshot(path, metric)?;
        if store.dimension != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: store.dimension,
            });
        }
        Ok(store)
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn upsert(&self, article: NewArticle) -> StoreResult<UpsertOutcome> {
        let url = article.url.trim().to_string();
        if url.is_empty() {
            return Err(StoreError::InvalidArticle("empty url".into()));
        }
        let now = Utc::now();
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if let Some(&id) = g.by_url.get(&url) {
            let stored = g.articles.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            let content_changed = !article.same_content(stored);
            stored.source = article.source;
            stored.title = article.title;
            stored.snippet = article.snippet;
            stored.full_text = article.full_text;
            stored.published_date = article.published_date;
            stored.updated_at = now;
            if content_changed {
                stored.revision += 1;
                if stored.embedding.take().is_some() {
                    debug!(target: "store", id, revision = stored.revision, "content changed, embedding cleared");
                }
            }
            return Ok(UpsertOutcome {
                id,
                created: false,
                revision: stored.revision,
                needs_embedding: !stored.has_embedding(),
            });
        }

        g.last_id += 1;
        let id = g.last_id;
        g.by_url.insert(url.clone(), id);
        g.articles.insert(
            id,
            TrendArticle {
                id,
                source: article.source,
                title: article.title,
                url,
                snippet: article.snippet,
                full_text: article.full_text,
                published_date: article.published_date,
                scraped_at: now,
                updated_at: now,
                revision: 0,
                embedding: None,
            },
        );
        gauge!("trends_store_articles").set(g.articles.len() as f64);
        Ok(UpsertOutcome {
            id,
            created: true,
            revision: 0,
            needs_embedding: true,
        })
    }

    async fn set_embedding(
        &self,
        id: ArticleId,
        revision: u64,
        embedding: Vec<f32>,
    ) -> StoreResult<()> {
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::InvalidEmbedding("non-finite component".into()));
        }
        if is_zero_vector(&embedding) {
            return Err(StoreError::InvalidEmbedding("zero magnitude".into()));
        }
        let mut g = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let article = g.articles.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if article.revision != revision {
            return Err(StoreError::Stale {
                id,
                embedded: revision,
                current: article.revision,
            });
        }
        article.embedding = Some(embedding);
        article.updated_at = Utc::now();
        Ok(())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> StoreResult<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;

        // Score ids first; clone only the winners.
        let mut scored: Vec<(ArticleId, f32)> = g
            .articles
            .values()
            .filter_map(|a| {
                let e = a.embedding.as_deref()?;
                self.metric.distance(query, e).map(|d| (a.id, d))
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .filter_map(|(id, distance)| {
                g.articles.get(&id).map(|a| Neighbor {
                    article: a.clone(),
                    distance,
                })
            })
            .collect())
    }

    async fn get(&self, id: ArticleId) -> StoreResult<Option<TrendArticle>> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(g.articles.get(&id).cloned())
    }

    async fn get_by_url(&self, url: &str) -> StoreResult<Option<TrendArticle>> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(g
            .by_url
            .get(url.trim())
            .and_then(|id| g.articles.get(id))
            .cloned())
    }

    async fn count(&self) -> StoreResult<usize> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(g.articles.len())
    }

    async fn pending_embeddings(&self, limit: usize) -> StoreResult<Vec<TrendArticle>> {
        let g = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(g
            .articles
            .values()
            .filter(|a| !a.has_embedding())
            .take(limit)
            .cloned()
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrendSource;

    fn article(url: &str, title: &str) -> NewArticle {
        NewArticle {
            source: TrendSource::Later,
            title: title.into(),
            url: url.into(),
            snippet: "snippet".into(),
            full_text: "body".into(),
            published_date: None,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_url() {
        let store = InMemoryStore::new(2);
        let a = store.upsert(article("https://x/1", "First")).await.unwrap();
        let b = store.upsert(article("https://x/1", "Second")).await.unwrap();
        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.id, b.id);
        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get_by_url("https://x/1").await.unwrap().unwrap();
        assert_eq!(stored.title, "Second");
    }

    #[tokio::test]
    async fn content_change_clears_embedding() {
        let store = InMemoryStore::new(2);
        let a = store.upsert(article("https://x/1", "First")).await.unwrap();
        store.set_embedding(a.id, 0, vec![1.0, 0.0]).await.unwrap();

        // Same content: embedding survives.
        let same = store.upsert(article("https://x/1", "First")).await.unwrap();
        assert!(!same.needs_embedding);

        // Title changed: stale vector dropped.
        let changed = store.upsert(article("https://x/1", "Renamed")).await.unwrap();
        assert!(changed.needs_embedding);
        assert!(store.get(a.id).await.unwrap().unwrap().embedding.is_none());
        assert!(store.nearest(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn late_embedding_for_old_content_is_rejected() {
        let store = InMemoryStore::new(2);
        let old = store.upsert(article("https://x/1", "Old")).await.unwrap();
        let new = store.upsert(article("https://x/1", "New")).await.unwrap();
        assert_eq!(old.revision, 0);
        assert_eq!(new.revision, 1);

        store.set_embedding(new.id, new.revision, vec![0.0, 1.0]).await.unwrap();
        assert!(matches!(
            store.set_embedding(old.id, old.revision, vec![1.0, 0.0]).await,
            Err(StoreError::Stale { embedded: 0, current: 1, .. })
        ));
        let stored = store.get(new.id).await.unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![0.0, 1.0]));

        // Unchanged content keeps the revision.
        let same = store.upsert(article("https://x/1", "New")).await.unwrap();
        assert_eq!(same.revision, 1);
        assert!(!same.needs_embedding);
    }

    #[tokio::test]
    async fn nearest_skips_unembedded_and_orders() {
        let store = InMemoryStore::new(2);
        let ids: Vec<_> = seed_ids(&store, 4).await;
        store.set_embedding(ids[0], 0, vec![3.0, 0.0]).await.unwrap();
        store.set_embedding(ids[1], 0, vec![1.0, 0.0]).await.unwrap();
        store.set_embedding(ids[3], 0, vec![2.0, 0.0]).await.unwrap();

        let hits = store.nearest(&[0.0, 0.0], 10).await.unwrap();
        let order: Vec<_> = hits.iter().map(|n| n.article.id).collect();
        assert_eq!(order, vec![ids[1], ids[3], ids[0]]);
        assert_eq!(hits[0].distance, 1.0);

        let top1 = store.nearest(&[0.0, 0.0], 1).await.unwrap();
        assert_eq!(top1.len(), 1);
        assert!(store.nearest(&[0.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equal_distances_keep_insertion_order() {
        let store = InMemoryStore::new(2);
        let ids = seed_ids(&store, 3).await;
        store.set_embedding(ids[2], 0, vec![0.0, 1.0]).await.unwrap();
        store.set_embedding(ids[0], 0, vec![1.0, 0.0]).await.unwrap();
        store.set_embedding(ids[1], 0, vec![0.0, -1.0]).await.unwrap();
        let order: Vec<_> = store
            .nearest(&[0.0, 0.0], 3)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.article.id)
            .collect();
        assert_eq!(order, ids);
    }

    #[tokio::test]
    async fn rejects_bad_embeddings() {
        let store = InMemoryStore::new(2);
        let a = store.upsert(article("https://x/1", "T")).await.unwrap();
        assert!(matches!(
            store.set_embedding(a.id, 0, vec![1.0, 0.0, 0.0]).await,
            Err(StoreError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            store.set_embedding(a.id, 0, vec![0.0, 0.0]).await,
            Err(StoreError::InvalidEmbedding(_))
        ));
        assert!(matches!(
            store.set_embedding(99, 0, vec![1.0, 0.0]).await,
            Err(StoreError::NotFound(99))
        ));
        assert!(matches!(
            store.nearest(&[1.0], 3).await,
            Err(StoreError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            store.upsert(article("  ", "T")).await,
            Err(StoreError::InvalidArticle(_))
        ));
    }

    #[tokio::test]
    async fn pending_lists_unembedded_in_id_order() {
        let store = InMemoryStore::new(2);
        let ids = seed_ids(&store, 3).await;
        store.set_embedding(ids[1], 0, vec![1.0, 1.0]).await.unwrap();
        let pending: Vec<_> = store
            .pending_embeddings(10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(pending, vec![ids[0], ids[2]]);
        assert_eq!(store.pending_embeddings(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trip_keeps_ids_and_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trends.json");

        let store = InMemoryStore::new(2);
        let ids = seed_ids(&store, 2).await;
        store.set_embedding(ids[1], 0, vec![0.5, 0.5]).await.unwrap();
        let store = Arc::new(store);
        store.clone().persist(path.clone()).await.unwrap();

        let loaded = InMemoryStore::open_or_new(&path, 2, DistanceMetric::Euclidean).unwrap();
        assert_eq!(loaded.count().await.unwrap(), 2);
        let hits = loaded.nearest(&[0.5, 0.5], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article.id, ids[1]);

        // New ids continue after the loaded ones.
        let next = loaded.upsert(article("https://x/new", "N")).await.unwrap();
        assert_eq!(next.id, ids[1] + 1);

        assert!(matches!(
            InMemoryStore::open_or_new(&path, 384, DistanceMetric::Euclidean),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    async fn seed_ids(store: &InMemoryStore, n: usize) -> Vec<ArticleId> {
        let mut ids = Vec::new();
        for i in 0..n {
            let out = store
                .upsert(article(&format!("https://x/{i}"), &format!("T{i}")))
                .await
                .unwrap();
            ids.push(out.id);
        }
        ids
    }
}
