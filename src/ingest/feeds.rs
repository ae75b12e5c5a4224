// src/ingest/feeds.rs
//! JSON article feeds: an array of `NewArticle` objects, read from an inline
//! fixture, a file on disk, or an HTTP endpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::ingest::types::ArticleFeed;
use crate::model::NewArticle;

pub struct JsonFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

impl JsonFeed {
    pub fn from_fixture(name: impl Into<String>, json: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    /// Feed named after the file stem, re-read on every fetch.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "json".to_string());
        Self {
            name,
            mode: Mode::File(path),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("trend-radar/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        })
    }

    /// One feed per `*.json` file in `dir`, sorted by path.
    pub fn load_dir(dir: &Path) -> Result<Vec<JsonFeed>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading feed dir {}", dir.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
            .collect();
        paths.sort();
        Ok(paths.into_iter().map(JsonFeed::from_path).collect())
    }

    fn parse(&self, body: &str) -> Result<Vec<NewArticle>> {
        let t0 = std::time::Instant::now();
        let items: Vec<NewArticle> =
            serde_json::from_str(body).with_context(|| format!("parsing feed {}", self.name))?;
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(items)
    }
}

#[async_trait]
impl ArticleFeed for JsonFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewArticle>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::File(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading feed file {}", path.display()))?,
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("fetching feed {url}"))?
                    .error_for_status()
                    .with_context(|| format!("feed {url} returned error status"))?;
                resp.text().await.context("reading feed body")?
            }
        };
        let items = self.parse(&body)?;
        counter!("ingest_feed_items_total", "feed" => self.name.clone())
            .increment(items.len() as u64);
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrendSource;

    const FIXTURE: &str = r#"[
      {"source": "later", "title": "Reels ideas", "url": "https://later.com/blog/reels",
       "snippet": "Short", "full_text": "Body", "published_date": "2025-01-10T00:00:00Z"},
      {"source": "sprout_social", "title": "Undated", "url": "https://sproutsocial.com/x",
       "full_text": "Body"}
    ]"#;

    #[tokio::test]
    async fn fixture_feed_parses_articles() {
        let feed = JsonFeed::from_fixture("mixed", FIXTURE);
        let items = feed.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, TrendSource::Later);
        assert!(items[0].published_date.is_some());
        assert!(items[1].published_date.is_none());
        assert_eq!(items[1].snippet, "");
        assert_eq!(feed.name(), "mixed");
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let feed = JsonFeed::from_fixture("bad", "{not json");
        assert!(feed.fetch_latest().await.is_err());
    }

    #[tokio::test]
    async fn load_dir_picks_json_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b_later.json"), "[]").unwrap();
        fs::write(dir.path().join("a_sprout.json"), FIXTURE).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore").unwrap();

        let feeds = JsonFeed::load_dir(dir.path()).unwrap();
        let names: Vec<_> = feeds.iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["a_sprout", "b_later"]);
        assert_eq!(feeds[0].fetch_latest().await.unwrap().len(), 2);
    }
}
