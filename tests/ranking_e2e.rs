// tests/ranking_e2e.rs
//
// End-to-end ranking over an in-memory store with a fixed query vector.
//
// Covered:
// - A/B/C scenario: similarity + recency blend decides the order A, C, B
// - top-k contract: len == min(k, candidates), sorted by viral_score desc
// - overfetch: a recent article outside the top-k by distance can still win
// - ties keep store order

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;

use trend_radar::embedding::EmbeddingProvider;
use trend_radar::model::{NewArticle, TrendSource};
use trend_radar::ranking::TrendRanker;
use trend_radar::store::{ArticleStore, InMemoryStore};

struct FixedProvider(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|_| self.0.clone()).collect()
    }
    fn dimension(&self) -> usize {
        self.0.len()
    }
    fn name(&self) -> &str {
        "fixed"
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

async fn seed(
    store: &InMemoryStore,
    title: &str,
    vector: Vec<f32>,
    published: Option<DateTime<Utc>>,
) {
    let out = store
        .upsert(NewArticle {
            source: TrendSource::Later,
            title: title.into(),
            url: format!("https://later.com/blog/{}", title.to_lowercase()),
            snippet: format!("{title} snippet"),
            full_text: format!("{title} body"),
            published_date: published,
        })
        .await
        .expect("upsert");
    store.set_embedding(out.id, out.revision, vector).await.expect("embed");
}

fn ranker(store: Arc<InMemoryStore>, query: Vec<f32>) -> TrendRanker {
    TrendRanker::new(Arc::new(FixedProvider(query)), store)
}

#[tokio::test]
async fn abc_scenario_ranks_a_c_b() {
    let store = Arc::new(InMemoryStore::new(2));
    let now = now();
    seed(&store, "A", vec![1.1, 0.0], Some(now)).await;
    seed(&store, "B", vec![1.05, 0.0], Some(now - Duration::days(200))).await;
    seed(&store, "C", vec![1.3, 0.0], Some(now - Duration::days(5))).await;

    let out = ranker(store, vec![1.0, 0.0]).search_at("reels", 10, now).await;

    let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "C", "B"]);

    let close = |a: f32, b: f32| (a - b).abs() < 1e-3;
    assert!(close(out[0].similarity, 0.909), "{}", out[0].similarity);
    assert!(close(out[0].viral_score, 0.936), "{}", out[0].viral_score);
    assert!(close(out[1].similarity, 0.769));
    assert!(close(out[1].viral_score, 0.838), "{}", out[1].viral_score);
    assert!(close(out[2].similarity, 0.952));
    assert!(close(out[2].viral_score, 0.727), "{}", out[2].viral_score);

    assert_eq!(out[0].source, "Later Blog");
    assert_eq!(out[0].snippet, "A snippet");
    assert_eq!(out[0].url, "https://later.com/blog/a");
}

#[tokio::test]
async fn top_k_contract_holds_for_random_stores() {
    let mut rng = rand::rng();
    let now = now();
    for n in [0usize, 1, 3, 12] {
        let store = Arc::new(InMemoryStore::new(4));
        for i in 0..n {
            let v: Vec<f32> = (0..4).map(|_| rng.random_range(0.1..1.0)).collect();
            let age = rng.random_range(0..400);
            seed(&store, &format!("T{i}"), v, Some(now - Duration::days(age))).await;
        }
        let r = ranker(store, vec![0.5, 0.5, 0.5, 0.5]);
        for k in [1usize, 5, 20] {
            let out = r.search_at("topic", k, now).await;
            assert_eq!(out.len(), k.min(n), "n={n} k={k}");
            assert!(out.windows(2).all(|w| w[0].viral_score >= w[1].viral_score));
            assert!(out.iter().all(|s| s.similarity > 0.0 && s.similarity <= 1.0));
        }
    }
}

#[tokio::test]
async fn overfetch_lets_recent_article_climb() {
    let store = Arc::new(InMemoryStore::new(2));
    let now = now();
    // Closest by distance but stale.
    seed(&store, "Old", vec![1.0, 0.0], Some(now - Duration::days(365))).await;
    // Second by distance, fresh.
    seed(&store, "Fresh", vec![1.2, 0.0], Some(now - Duration::days(1))).await;

    let out = ranker(store.clone(), vec![1.0, 0.0]).search_at("t", 1, now).await;
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].title, "Fresh");

    // Without overfetch only the closest candidate is seen.
    let narrow = ranker(store, vec![1.0, 0.0])
        .with_overfetch(1)
        .search_at("t", 1, now)
        .await;
    assert_eq!(narrow[0].title, "Old");
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let store = Arc::new(InMemoryStore::new(2));
    let now = now();
    seed(&store, "First", vec![0.0, 1.0], None).await;
    seed(&store, "Second", vec![1.0, 0.0], None).await;
    seed(&store, "Third", vec![0.0, -1.0], None).await;

    let out = ranker(store, vec![0.0, 0.0]).search_at("t", 3, now).await;
    let titles: Vec<_> = out.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn get_trend_snippets_uses_wall_clock() {
    let store = Arc::new(InMemoryStore::new(2));
    seed(&store, "Now", vec![1.0, 0.0], Some(Utc::now())).await;
    let out = ranker(store, vec![1.0, 0.0]).get_trend_snippets("t", 5).await;
    assert_eq!(out.len(), 1);
    assert!((out[0].viral_score - 1.0).abs() < 1e-6);
}
