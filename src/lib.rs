//! Market Scout - marketplace listing extraction, ranking and tagging
//!
//! Pulls search result pages from the marketplace, extracts listing records
//! through ordered selector chains, ranks and deduplicates them, and attaches
//! descriptive tags.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{PipelineReport, RankingEngine, ScrapePipeline, TagEnricher};
pub use domain::{Condition, FilterSet, ProductDetail, ProductRecord, QueryInput};
pub use infrastructure::ScoutConfig;
