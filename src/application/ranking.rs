//! Deduplication and ranking engine
//!
//! Scores every record as a weighted sum of four sub-scores, sorts by the
//! composite (stable, so ties keep batch order), then greedily drops titles
//! that overlap an already kept, higher ranked title.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::product::ProductRecord;
use crate::domain::query::QueryInput;
use crate::infrastructure::config::{RankingConfig, ScoreWeights};

/// Normalized sub-scores, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub relevance: f64,
    pub price: f64,
    pub condition: f64,
    pub seller_rating: f64,
}

impl SubScores {
    pub fn composite(&self, weights: &ScoreWeights) -> f64 {
        self.relevance * weights.relevance
            + self.price * weights.price
            + self.condition * weights.condition
            + self.seller_rating * weights.seller_rating
    }
}

/// Price extremes of the batch being ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: u64,
    pub max: u64,
}

impl PriceBounds {
    pub fn of(records: &[ProductRecord]) -> Option<Self> {
        let min = records.iter().map(|r| r.price).min()?;
        let max = records.iter().map(|r| r.price).max()?;
        Some(Self { min, max })
    }

    /// 1.0 for the cheapest listing, 0.0 for the most expensive.
    pub fn price_score(&self, price: u64) -> f64 {
        if self.max == self.min {
            return 1.0;
        }
        let price = price.clamp(self.min, self.max);
        (self.max - price) as f64 / (self.max - self.min) as f64
    }
}

/// Ranked batch plus dedup accounting
#[derive(Debug, Clone, Default)]
pub struct RankedBatch {
    pub records: Vec<ProductRecord>,
    pub duplicates_removed: usize,
}

/// Share of words two titles have in common, relative to the longer title.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    let longest = words_a.len().max(words_b.len());
    if longest == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / longest as f64
}

#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub const fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Sub-scores of one record against the batch bounds and the query.
    pub fn score_breakdown(
        &self,
        record: &ProductRecord,
        bounds: PriceBounds,
        query: &QueryInput,
    ) -> SubScores {
        SubScores {
            relevance: self.relevance_score(record, query),
            price: bounds.price_score(record.price),
            condition: record.condition.score(),
            seller_rating: record
                .rating()
                .map_or(self.config.missing_rating_score, |rating| f64::from(rating) / 5.0),
        }
    }

    fn relevance_score(&self, record: &ProductRecord, query: &QueryInput) -> f64 {
        let text = record.search_text();
        let keywords = query.normalized_keywords();

        let mut score = if keywords.is_empty() {
            0.0
        } else {
            let matched = keywords.iter().filter(|k| text.contains(k.as_str())).count();
            matched as f64 / keywords.len() as f64
        };
        if query.filters.brand_matches(record) {
            score += self.config.brand_bonus;
        }
        if query.filters.category_matches(record) {
            score += self.config.category_bonus;
        }
        score.min(1.0)
    }

    /// Rank a batch: copies of the input with `score` attached, best first,
    /// near-duplicate titles removed.
    pub fn rank(&self, records: &[ProductRecord], query: &QueryInput) -> Vec<ProductRecord> {
        self.rank_batch(records, query).records
    }

    pub fn rank_batch(&self, records: &[ProductRecord], query: &QueryInput) -> RankedBatch {
        let Some(bounds) = PriceBounds::of(records) else {
            return RankedBatch::default();
        };
        let weights = self.config.weights;

        let mut scored: Vec<(f64, &ProductRecord)> = records
            .par_iter()
            .map(|record| {
                let score = self.score_breakdown(record, bounds, query).composite(&weights);
                (score, record)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut kept: Vec<ProductRecord> = Vec::with_capacity(scored.len());
        let mut duplicates_removed = 0;
        for (score, record) in scored {
            let duplicate_of = kept.iter().find(|survivor| {
                word_overlap(&survivor.title, &record.title) > self.config.duplicate_threshold
            });
            if let Some(survivor) = duplicate_of {
                debug!(
                    "Dropping '{}' ({:.3}) as duplicate of '{}'",
                    record.title,
                    score,
                    survivor.title
                );
                duplicates_removed += 1;
                continue;
            }
            kept.push(record.with_score(score));
        }

        info!(
            "Ranked {} records, {} kept, {} duplicates removed",
            records.len(),
            kept.len(),
            duplicates_removed
        );
        RankedBatch {
            records: kept,
            duplicates_removed,
        }
    }
}
