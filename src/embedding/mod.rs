//! Embedding provider abstraction + remote backends.
//!
//! Two layers, mirroring how callers should see failures:
//! - `EmbeddingBackend` does the real call and reports errors (`anyhow::Result`).
//! - `Embedder` wraps a backend with input truncation, a bounded timeout and
//!   validation, and implements `EmbeddingProvider`, which never fails: an
//!   empty vector means "no embedding available, skip this item".
//!
//! The backend is selected once from config (`build_provider`) and injected as
//! `DynEmbeddingProvider` into ranking and ingest.

pub mod gemini;
pub mod hashing;
pub mod openai;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::scoring::is_zero_vector;

/// Inputs longer than this many characters are cut (prefix kept).
pub const MAX_INPUT_CHARS: usize = 8_000;

/// What ranking and ingest depend on.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Empty vector on any failure.
    async fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_batch(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// One vector per input, in order; an empty entry marks a failed item.
    /// Returns an empty `Vec` when the whole request failed.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;

    /// Dimensionality this provider is configured to produce.
    fn dimension(&self) -> usize;

    /// Provider name for diagnostics.
    fn name(&self) -> &str;
}

/// Convenient alias used by callers.
pub type DynEmbeddingProvider = Arc<dyn EmbeddingProvider>;

/// Low-level backend: does the remote call. Separated so the same wrapper
/// serves production backends and tests.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync + 'static {
    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn name(&self) -> &'static str;
}

/// Truncation + timeout + validation around a backend.
pub struct Embedder<B: EmbeddingBackend> {
    backend: B,
    dimension: usize,
    timeout: Duration,
    max_input_chars: usize,
}

impl<B: EmbeddingBackend> Embedder<B> {
    pub fn new(backend: B, dimension: usize) -> Self {
        Self {
            backend,
            dimension,
            timeout: Duration::from_millis(crate::config::trends::DEFAULT_EMBED_TIMEOUT_MS),
            max_input_chars: MAX_INPUT_CHARS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max.max(1);
        self
    }

    fn record_failure(&self, reason: &'static str) {
        counter!(
            "trends_embed_failures_total",
            "provider" => self.backend.name(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Drop vectors no caller can use.
    fn validate(&self, v: Vec<f32>) -> Vec<f32> {
        if v.is_empty() {
            self.record_failure("empty_vector");
            return v;
        }
        if v.len() != self.dimension {
            self.record_failure("wrong_dimension");
            warn!(
                target: "embedding",
                provider = self.backend.name(),
                expected = self.dimension,
                got = v.len(),
                "embedding of wrong dimensionality dropped"
            );
            return Vec::new();
        }
        if v.iter().any(|x| !x.is_finite()) {
            self.record_failure("non_finite");
            warn!(target: "embedding", provider = self.backend.name(), "non-finite embedding dropped");
            return Vec::new();
        }
        if is_zero_vector(&v) {
            self.record_failure("zero_vector");
            warn!(target: "embedding", provider = self.backend.name(), "zero-magnitude embedding dropped");
            return Vec::new();
        }
        v
    }
}

#[async_trait]
impl<B: EmbeddingBackend> EmbeddingProvider for Embedder<B> {
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let provider = self.backend.name();
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t, self.max_input_chars).to_string())
            .collect();

        counter!("trends_embed_requests_total", "provider" => provider).increment(1);
        let t0 = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.backend.fetch(&inputs)).await;
        histogram!("trends_embed_ms", "provider" => provider)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        let vectors = match outcome {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                self.record_failure("provider_error");
                warn!(target: "embedding", provider, error = %e, "embedding request failed");
                return Vec::new();
            }
            Err(_) => {
                self.record_failure("timeout");
                warn!(
                    target: "embedding",
                    provider,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "embedding request timed out"
                );
                return Vec::new();
            }
        };

        if vectors.len() != inputs.len() {
            self.record_failure("malformed");
            warn!(
                target: "embedding",
                provider,
                expected = inputs.len(),
                got = vectors.len(),
                "embedding response count mismatch"
            );
            return Vec::new();
        }

        debug!(target: "embedding", provider, n = vectors.len(), "embedded batch");
        vectors.into_iter().map(|v| self.validate(v)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

/// Returns empty vectors always; used when embeddings are switched off.
pub struct DisabledProvider {
    pub dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    async fn embed_batch(&self, _texts: &[String]) -> Vec<Vec<f32>> {
        Vec::new()
    }
    fn dimension(&self) -> usize {
        self.dimension
    }
    fn name(&self) -> &str {
        "disabled"
    }
}

/// Factory: build the configured provider once at startup.
pub fn build_provider(cfg: &EmbeddingConfig) -> Result<DynEmbeddingProvider> {
    let timeout = Duration::from_millis(cfg.timeout_ms);
    let provider: DynEmbeddingProvider = match cfg.provider {
        ProviderKind::OpenAi => {
            let backend = openai::OpenAiBackend::new(
                cfg.resolve_api_key()?,
                cfg.model.as_deref(),
                cfg.base_url.as_deref(),
                cfg.dimension,
            )?;
            Arc::new(wrap(backend, cfg, timeout))
        }
        ProviderKind::Gemini => {
            let backend = gemini::GeminiBackend::new(
                cfg.resolve_api_key()?,
                cfg.model.as_deref(),
                cfg.base_url.as_deref(),
                cfg.dimension,
            )?;
            Arc::new(wrap(backend, cfg, timeout))
        }
        ProviderKind::Hashing => {
            Arc::new(wrap(hashing::HashingBackend::new(cfg.dimension), cfg, timeout))
        }
        ProviderKind::Disabled => Arc::new(DisabledProvider {
            dimension: cfg.dimension,
        }),
    };
    Ok(provider)
}

fn wrap<B: EmbeddingBackend>(backend: B, cfg: &EmbeddingConfig, timeout: Duration) -> Embedder<B> {
    Embedder::new(backend, cfg.dimension)
        .with_timeout(timeout)
        .with_max_input_chars(cfg.max_input_chars)
}

/// Deployment-time contract: provider output must match what the store indexes.
pub fn ensure_dimensions(provider: usize, store: usize) -> Result<()> {
    if provider != store {
        bail!("embedding dimension mismatch: provider produces {provider}, store indexes {store}");
    }
    Ok(())
}

/// Keep at most `max` chars, cutting at the end on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
