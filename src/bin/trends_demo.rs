//! Ingest the configured feeds once and print the ranked trends for a topic.
//!
//! `TRENDS_EMBEDDING_PROVIDER=hashing cargo run --bin trends_demo -- "instagram reels"`

use anyhow::Result;
use trend_radar::config::TrendsConfig;
use trend_radar::TrendService;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let topic = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let mut config = TrendsConfig::load_default()?;
    // One-shot run: nothing to persist.
    config.store.snapshot_path = None;
    let service = TrendService::from_config(config)?;

    let feeds = service.feeds()?;
    let jobs = service.pipeline.run_feeds(&feeds).await;
    for job in &jobs {
        println!(
            "{:<24} {:?} created={} embedded={}",
            job.source, job.status, job.articles_created, job.embeddings_written
        );
    }

    let hits = service.ranker.search_default(&topic).await;
    println!("{}", serde_json::to_string_pretty(&hits)?);
    Ok(())
}
