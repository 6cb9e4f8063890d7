//! HTML parsing infrastructure for marketplace search results
//!
//! Field values are located through ordered strategy chains (`selector_chain`)
//! built from configuration data, then assembled into records per item node.

pub mod config;
pub mod context;
pub mod error;
pub mod field_extractor;
pub mod item_extractor;
pub mod product_detail_parser;
pub mod product_list_parser;
pub mod selector_chain;

// Re-export public types
pub use config::{ExtractionConfig, FieldKind, SelectorChains, StrategySpec};
pub use context::ParseContext;
pub use error::{ParsingError, ParsingResult};
pub use field_extractor::FieldExtractor;
pub use item_extractor::ItemExtractor;
pub use product_detail_parser::ProductDetailParser;
pub use product_list_parser::{ExtractionReport, ProductListParser};
pub use selector_chain::{RawValue, SelectorChainResolver};

use scraper::Html;

/// Parser trait with context support
pub trait ContextualParser {
    type Output;
    type Context;

    /// Parse HTML with contextual information
    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output>;
}
