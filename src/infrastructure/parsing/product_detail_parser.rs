//! Item page parser
//!
//! Finds the item page root with the first matching detail selector, then
//! runs the same field chains the search cards use over that root.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::config::{ExtractionConfig, FieldKind};
use super::product_list_parser::compile_selectors;
use super::selector_chain::{RawValue, SelectorChainResolver, parse_item_id};
use super::{ContextualParser, ParseContext, ParsingResult};
use crate::domain::category::{OTHER, normalize_category};
use crate::domain::product::ProductDetail;

#[derive(Debug)]
pub struct ProductDetailParser {
    roots: Vec<(String, Selector)>,
    resolver: SelectorChainResolver,
}

impl ProductDetailParser {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ExtractionConfig::default())
    }

    pub fn with_config(config: &ExtractionConfig) -> ParsingResult<Self> {
        Ok(Self {
            roots: compile_selectors("detail_container_selectors", &config.detail_container_selectors)?,
            resolver: SelectorChainResolver::from_config(config)?,
        })
    }

    /// Parse a raw item page. The context's `url` metadata supplies the id
    /// when the page itself does not carry one.
    pub fn parse_html(&self, html: &str, context: &ParseContext) -> ParsingResult<ProductDetail> {
        let document = Html::parse_document(html);
        self.parse_with_context(&document, context)
    }

    fn locate_root<'a>(&self, html: &'a Html) -> Option<(&str, ElementRef<'a>)> {
        self.roots
            .iter()
            .find_map(|(label, selector)| html.select(selector).next().map(|root| (label.as_str(), root)))
    }

    fn text(&self, field: FieldKind, root: ElementRef<'_>) -> Option<String> {
        self.resolver.resolve(field, root).and_then(RawValue::into_text)
    }
}

impl ContextualParser for ProductDetailParser {
    type Output = ProductDetail;
    type Context = ParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output> {
        let Some((label, root)) = self.locate_root(html) else {
            warn!("No item page root on {}", context.describe());
            return Ok(ProductDetail::default());
        };
        debug!("Item page root {} on {}", label, context.describe());

        let detail = ProductDetail {
            id: context
                .url()
                .and_then(parse_item_id)
                .or_else(|| self.text(FieldKind::ItemId, root)),
            title: self.text(FieldKind::Title, root),
            price: self
                .resolver
                .resolve(FieldKind::Price, root)
                .and_then(|v| v.as_price()),
            condition: self
                .resolver
                .resolve(FieldKind::Condition, root)
                .and_then(|v| v.as_condition()),
            seller_rating: self
                .resolver
                .resolve(FieldKind::Rating, root)
                .and_then(|v| v.as_rating()),
            category: self
                .text(FieldKind::Category, root)
                .map(|c| normalize_category(&c))
                .filter(|c| c != OTHER),
            brand: self
                .text(FieldKind::Brand, root)
                .filter(|b| !b.eq_ignore_ascii_case("unknown")),
            description: self.text(FieldKind::Description, root),
            image_url: self.text(FieldKind::Image, root),
        };

        if detail.is_empty() {
            debug!("Item page on {} added nothing beyond the search card", context.describe());
        }
        Ok(detail)
    }
}
