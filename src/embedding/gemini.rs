//! Gemini embeddings backend (`models/{model}:batchEmbedContents`).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingBackend;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "text-embedding-004";
/// Articles and topics go through the same call, so both sides use one task type.
pub const TASK_TYPE: &str = "SEMANTIC_SIMILARITY";

pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Values>,
}

#[derive(Deserialize)]
struct Values {
    values: Vec<f32>,
}

impl GeminiBackend {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
        dimension: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            bail!("Gemini embeddings need an API key");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("trend-radar/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .context("building Gemini http client")?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiBackend {
    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);
        let model_ref = format!("models/{}", self.model);
        let req = BatchRequest {
            requests: texts
                .iter()
                .map(|t| EmbedRequest {
                    model: &model_ref,
                    content: Content {
                        parts: vec![Part { text: t }],
                    },
                    task_type: TASK_TYPE,
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini embedding error ({status}): {body}"));
        }

        let body: BatchResponse = resp.json().await.context("decoding Gemini embeddings")?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
