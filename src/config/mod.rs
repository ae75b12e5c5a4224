// src/config/mod.rs
pub mod trends;

pub use trends::{
    EmbeddingConfig, IngestConfig, ProviderKind, RankingConfig, StoreConfig, TrendsConfig,
};
