//! Pure scoring helpers for trend ranking.
//!
//! - `l2_distance` / `cosine_similarity`: vector comparison
//! - `similarity`: maps a distance into (0, 1], `1 / (1 + d)`
//! - `recency_factor`: step function over article age in whole days (UTC)
//! - `ScoringWeights`: the relevance/recency blend behind the viral score
//!
//! viral = similarity * w_relevance + recency * w_recency

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_RELEVANCE_WEIGHT: f32 = 0.7;
pub const DEFAULT_RECENCY_WEIGHT: f32 = 0.3;

/// Recency used when an article has no publication date.
pub const UNDATED_RECENCY: f32 = 0.5;
/// Recency for anything older than the last bucket.
pub const STALE_RECENCY: f32 = 0.2;

/// (max age in days, inclusive) -> factor. Checked in order.
const RECENCY_BUCKETS: [(i64, f32); 4] = [(7, 1.0), (30, 0.8), (90, 0.6), (180, 0.4)];

/// Bucketed freshness of an article. Not interpolated.
///
/// Age is counted in whole elapsed days, so 7 days 23 hours is still 7.
/// Publication dates in the future count as fresh.
pub fn recency_factor(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    let Some(published) = published else {
        return UNDATED_RECENCY;
    };
    let days_old = now.signed_duration_since(published).num_days();
    RECENCY_BUCKETS
        .iter()
        .find(|(max_days, _)| days_old <= *max_days)
        .map(|(_, factor)| *factor)
        .unwrap_or(STALE_RECENCY)
}

/// Distance metric used by a store, for both ingestion and query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`, range [0, 2].
    Cosine,
}

impl DistanceMetric {
    /// `None` when the vectors differ in length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Option<f32> {
        match self {
            DistanceMetric::Euclidean => l2_distance(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }
}

/// Euclidean distance. `None` when the vectors differ in length.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum();
    Some(sum.sqrt())
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn is_zero_vector(v: &[f32]) -> bool {
    magnitude(v) == 0.0
}

/// Cosine similarity in [-1, 1]; 0.0 for zero-magnitude or mismatched input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let (na, nb) = (magnitude(a), magnitude(b));
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(1.0 - cosine_similarity(a, b))
}

/// `1 / (1 + distance)`. Negative input is treated as 0, NaN as infinitely far.
pub fn similarity(distance: f32) -> f32 {
    let d = if distance.is_nan() {
        f32::INFINITY
    } else {
        distance.max(0.0)
    };
    1.0 / (1.0 + d)
}

/// Blend weights for the viral score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringWeights {
    pub relevance: f32,
    pub recency: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: DEFAULT_RELEVANCE_WEIGHT,
            recency: DEFAULT_RECENCY_WEIGHT,
        }
    }
}

impl ScoringWeights {
    pub fn new(relevance: f32, recency: f32) -> Self {
        Self { relevance, recency }
    }

    /// Both weights finite and non-negative, not both zero.
    pub fn is_valid(&self) -> bool {
        let ok = |w: f32| w.is_finite() && w >= 0.0;
        ok(self.relevance) && ok(self.recency) && (self.relevance + self.recency) > 0.0
    }

    pub fn viral_score(&self, similarity: f32, recency: f32) -> f32 {
        similarity * self.relevance + recency * self.recency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn aged(days: i64, hours: i64) -> Option<DateTime<Utc>> {
        Some(now() - Duration::days(days) - Duration::hours(hours))
    }

    #[test]
    fn recency_buckets_are_inclusive() {
        assert_eq!(recency_factor(None, now()), 0.5);
        assert_eq!(recency_factor(aged(0, 0), now()), 1.0);
        assert_eq!(recency_factor(aged(7, 0), now()), 1.0);
        assert_eq!(recency_factor(aged(7, 23), now()), 1.0);
        assert_eq!(recency_factor(aged(8, 0), now()), 0.8);
        assert_eq!(recency_factor(aged(30, 0), now()), 0.8);
        assert_eq!(recency_factor(aged(31, 0), now()), 0.6);
        assert_eq!(recency_factor(aged(90, 0), now()), 0.6);
        assert_eq!(recency_factor(aged(91, 0), now()), 0.4);
        assert_eq!(recency_factor(aged(180, 0), now()), 0.4);
        assert_eq!(recency_factor(aged(181, 0), now()), 0.2);
        assert_eq!(recency_factor(aged(2000, 0), now()), 0.2);
    }

    #[test]
    fn future_dates_count_as_fresh() {
        assert_eq!(recency_factor(aged(-3, 0), now()), 1.0);
    }

    #[test]
    fn l2_distance_basics() {
        assert_eq!(l2_distance(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(l2_distance(&[1.0, 2.0], &[1.0, 2.0]), Some(0.0));
        assert_eq!(l2_distance(&[1.0], &[1.0, 2.0]), None);
    }

    #[test]
    fn cosine_guards_zero_magnitude() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_transform_range_and_order() {
        assert_eq!(similarity(0.0), 1.0);
        assert!((similarity(1.0) - 0.5).abs() < 1e-6);
        assert!(similarity(0.1) > similarity(0.2));
        assert!(similarity(1e6) > 0.0);
        assert_eq!(similarity(-1.0), 1.0);
        assert_eq!(similarity(f32::NAN), 0.0);
    }

    #[test]
    fn viral_score_blend() {
        let w = ScoringWeights::default();
        let s = w.viral_score(similarity(0.1), 1.0);
        assert!((s - 0.936).abs() < 1e-3);
        assert!(w.is_valid());
        assert!(!ScoringWeights::new(f32::NAN, 0.3).is_valid());
        assert!(!ScoringWeights::new(-0.1, 0.3).is_valid());
        assert!(!ScoringWeights::new(0.0, 0.0).is_valid());
    }
}
