//! Article store abstraction.
//!
//! The store owns articles and their embeddings and answers nearest-neighbour
//! queries. Distance is computed inside the store so a backend can swap the
//! brute-force scan for an ANN index without the ranking service noticing.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ArticleId, NewArticle, TrendArticle};

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article {0} not found")]
    NotFound(ArticleId),

    /// Provider and store disagree on dimensionality: a deployment misconfiguration.
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// The article's content changed after the embedding was computed.
    #[error("article {id} is at revision {current}, embedding was computed for {embedded}")]
    Stale {
        id: ArticleId,
        embedded: u64,
        current: u64,
    },

    #[error("invalid article: {0}")]
    InvalidArticle(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: ArticleId,
    pub created: bool,
    /// Content revision to pass back to `set_embedding`.
    pub revision: u64,
    /// No current embedding: new article, or its content changed and the old vector was dropped.
    pub needs_embedding: bool,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub article: TrendArticle,
    pub distance: f32,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert or update by `url`. Re-ingesting a URL never duplicates it.
    async fn upsert(&self, article: NewArticle) -> StoreResult<UpsertOutcome>;

    /// Persist an embedding computed from content at `revision`. Rejected
    /// with `StoreError::Stale` when the article has moved on since.
    async fn set_embedding(
        &self,
        id: ArticleId,
        revision: u64,
        embedding: Vec<f32>,
    ) -> StoreResult<()>;

    /// Up to `limit` embedded articles, closest first. Articles without an
    /// embedding are never returned. Equal distances keep insertion order.
    async fn nearest(&self, query: &[f32], limit: usize) -> StoreResult<Vec<Neighbor>>;

    async fn get(&self, id: ArticleId) -> StoreResult<Option<TrendArticle>>;

    async fn get_by_url(&self, url: &str) -> StoreResult<Option<TrendArticle>>;

    async fn count(&self) -> StoreResult<usize>;

    /// Articles still waiting for an embedding, oldest first.
    async fn pending_embeddings(&self, limit: usize) -> StoreResult<Vec<TrendArticle>>;

    /// Dimensionality the store indexes.
    fn dimension(&self) -> usize;
}
