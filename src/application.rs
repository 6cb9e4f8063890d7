//! Application layer module
//!
//! Ranking, tag enrichment and the scrape pipeline that ties the
//! infrastructure stages together.

pub mod pipeline;
pub mod ranking;
pub mod tagging;

pub use pipeline::{PipelineError, PipelineReport, ScrapePipeline};
pub use ranking::{PriceBounds, RankedBatch, RankingEngine, SubScores, word_overlap};
pub use tagging::{PriceStats, TagEnricher, TagSummary, scrub_generic_phrases};
