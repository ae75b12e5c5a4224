// src/model.rs
//! Trend article records, ingest input, and the ranked snippet handed to content generation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring;

/// Number of `full_text` characters that take part in the article embedding.
pub const FULL_TEXT_EMBED_PREFIX: usize = 1000;

/// Opaque article identity assigned by the store.
pub type ArticleId = u64;

/// Sites the trend scrapers pull from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrendSource {
    SproutSocial,
    Later,
    SocialMediaExaminer,
}

impl TrendSource {
    pub const ALL: [TrendSource; 3] = [
        TrendSource::SproutSocial,
        TrendSource::Later,
        TrendSource::SocialMediaExaminer,
    ];

    /// Stable storage key, e.g. `sprout_social`.
    pub fn key(&self) -> &'static str {
        match self {
            TrendSource::SproutSocial => "sprout_social",
            TrendSource::Later => "later",
            TrendSource::SocialMediaExaminer => "social_media_examiner",
        }
    }

    /// Human-readable label shown to the content generator.
    pub fn label(&self) -> &'static str {
        match self {
            TrendSource::SproutSocial => "Sprout Social Insights",
            TrendSource::Later => "Later Blog",
            TrendSource::SocialMediaExaminer => "Social Media Examiner",
        }
    }

    /// Case-insensitive lookup by key.
    pub fn from_key(raw: &str) -> Option<Self> {
        let k = raw.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.key().eq_ignore_ascii_case(k))
    }
}

impl fmt::Display for TrendSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One scraped trend article as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendArticle {
    pub id: ArticleId,
    pub source: TrendSource,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub full_text: String,
    pub published_date: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped each time the embedded content changes. An embedding is only
    /// accepted for the revision it was computed from.
    #[serde(default)]
    pub revision: u64,
    /// `None` until the ingest pipeline has embedded the current content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl TrendArticle {
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Text the embedding of this article is computed from.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.snippet, &self.full_text)
    }

    pub fn recency_factor(&self, now: DateTime<Utc>) -> f32 {
        scoring::recency_factor(self.published_date, now)
    }
}

/// Article as delivered by a feed, before it has an identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewArticle {
    pub source: TrendSource,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    pub full_text: String,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
}

impl NewArticle {
    /// True when the fields feeding the embedding are unchanged.
    pub fn same_content(&self, stored: &TrendArticle) -> bool {
        self.title == stored.title
            && self.snippet == stored.snippet
            && self.full_text == stored.full_text
    }

    pub fn embedding_text(&self) -> String {
        embedding_text(&self.title, &self.snippet, &self.full_text)
    }
}

/// `title \n snippet \n first 1000 chars of full_text`.
pub fn embedding_text(title: &str, snippet: &str, full_text: &str) -> String {
    let prefix: String = full_text.chars().take(FULL_TEXT_EMBED_PREFIX).collect();
    format!("{title}\n{snippet}\n{prefix}")
}

/// Output unit of a trend search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSnippet {
    pub title: String,
    pub url: String,
    /// Display label of the source site.
    pub source: String,
    pub snippet: String,
    pub viral_score: f32,
    pub similarity: f32,
}
