// src/ingest/types.rs
use anyhow::Result;

use crate::model::NewArticle;

/// Anything that can hand the pipeline a batch of freshly scraped articles.
#[async_trait::async_trait]
pub trait ArticleFeed: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewArticle>>;
    fn name(&self) -> &str;
}
