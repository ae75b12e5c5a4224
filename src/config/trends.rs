// src/config/trends.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fs};
use tracing::warn;

use crate::scoring::{
    DistanceMetric, ScoringWeights, DEFAULT_RECENCY_WEIGHT, DEFAULT_RELEVANCE_WEIGHT,
};

// --- env defaults & names ---
pub const DEFAULT_TRENDS_CONFIG_PATH: &str = "config/trends.toml";
pub const ENV_TRENDS_CONFIG_PATH: &str = "TRENDS_CONFIG_PATH";
pub const ENV_EMBEDDING_PROVIDER: &str = "TRENDS_EMBEDDING_PROVIDER";
pub const ENV_RELEVANCE_WEIGHT: &str = "TRENDS_RANKING_RELEVANCE_WEIGHT";
pub const ENV_RECENCY_WEIGHT: &str = "TRENDS_RANKING_RECENCY_WEIGHT";

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_EMBED_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_OVERFETCH: usize = 2;

/// Which embedding backend the process talks to. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Gemini,
    /// Deterministic local feature hashing; no network.
    Hashing,
    Disabled,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "hashing" | "mock" => Ok(ProviderKind::Hashing),
            "disabled" | "off" | "none" => Ok(ProviderKind::Disabled),
            other => Err(anyhow!("unsupported embedding provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Backend default when absent.
    pub model: Option<String>,
    pub dimension: usize,
    pub timeout_ms: u64,
    pub max_input_chars: usize,
    /// "ENV" means: read OPENAI_API_KEY / GEMINI_API_KEY by provider.
    pub api_key: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_ms: DEFAULT_EMBED_TIMEOUT_MS,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            api_key: "ENV".to_string(),
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    /// Resolve the API key for remote providers. Missing key is a startup error.
    pub fn resolve_api_key(&self) -> Result<String> {
        if !self.api_key.trim().eq_ignore_ascii_case("env") {
            return Ok(self.api_key.trim().to_string());
        }
        let var = match self.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Hashing | ProviderKind::Disabled => return Ok(String::new()),
        };
        env::var(var).map_err(|_| anyhow!("Missing {var} env var"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub relevance_weight: f32,
    pub recency_weight: f32,
    pub default_k: usize,
    /// Candidates fetched per requested result before re-ranking.
    pub overfetch: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: DEFAULT_RELEVANCE_WEIGHT,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            default_k: DEFAULT_K,
            overfetch: DEFAULT_OVERFETCH,
        }
    }
}

impl RankingConfig {
    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights::new(self.relevance_weight, self.recency_weight)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub metric: DistanceMetric,
    /// JSON snapshot written after each ingest run and loaded at startup.
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub interval_secs: u64,
    /// Directory of `*.json` feed files.
    pub fixtures_dir: Option<PathBuf>,
    pub job_history: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 3600,
            fixtures_dir: None,
            job_history: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrendsConfig {
    pub embedding: EmbeddingConfig,
    pub ranking: RankingConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
}

impl TrendsConfig {
    /// Parse from TOML and sanitize. Does not read the environment.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: TrendsConfig = toml::from_str(s).context("parsing trends config")?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading trends config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $TRENDS_CONFIG_PATH (must exist)
    /// 2) config/trends.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_TRENDS_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_TRENDS_CONFIG_PATH} points to non-existent path");
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_TRENDS_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Provider toggle and weight overrides from the environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = env::var(ENV_EMBEDDING_PROVIDER) {
            self.embedding.provider = raw.parse()?;
        }
        if let Some(w) = parse_weight_env(env::var(ENV_RELEVANCE_WEIGHT).ok()) {
            self.ranking.relevance_weight = w;
        }
        if let Some(w) = parse_weight_env(env::var(ENV_RECENCY_WEIGHT).ok()) {
            self.ranking.recency_weight = w;
        }
        self.sanitize()
    }

    fn sanitize(&mut self) -> Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be greater than zero");
        }
        if self.embedding.timeout_ms == 0 {
            self.embedding.timeout_ms = DEFAULT_EMBED_TIMEOUT_MS;
        }
        if self.embedding.max_input_chars == 0 {
            self.embedding.max_input_chars = DEFAULT_MAX_INPUT_CHARS;
        }
        if !self.ranking.weights().is_valid() {
            warn!(
                target: "trends",
                relevance = self.ranking.relevance_weight,
                recency = self.ranking.recency_weight,
                "invalid ranking weights, using defaults"
            );
            self.ranking.relevance_weight = DEFAULT_RELEVANCE_WEIGHT;
            self.ranking.recency_weight = DEFAULT_RECENCY_WEIGHT;
        }
        if self.ranking.default_k == 0 {
            self.ranking.default_k = DEFAULT_K;
        }
        self.ranking.overfetch = self.ranking.overfetch.max(1);
        if self.ingest.interval_secs == 0 {
            self.ingest.interval_secs = IngestConfig::default().interval_secs;
        }
        Ok(())
    }
}

// parse optional float env; negative or non-finite is ignored
fn parse_weight_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}
