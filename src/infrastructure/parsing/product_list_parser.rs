//! Search results parser
//!
//! Locates item containers with the first non-empty selector from the
//! configured chain, then runs the item extractor on each node with per-node
//! isolation.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::ExtractionConfig;
use super::item_extractor::ItemExtractor;
use super::{ContextualParser, ParseContext, ParsingError, ParsingResult};
use crate::domain::product::ProductRecord;

/// Label reported when containers came from the `/item/` link fallback.
pub const FALLBACK_CONTAINER_LABEL: &str = "fallback:item-link-parents";

/// Label reported when containers are the parents of bare yen amounts.
pub const FALLBACK_PRICE_LABEL: &str = "fallback:price-text-parents";

static PRICE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[¥￥]\s*[0-9][0-9,]*").expect("static regex"));

/// Parents of text nodes holding a yen amount, in document order.
pub fn price_text_parents(html: &Html) -> Vec<ElementRef<'_>> {
    let mut seen = HashSet::new();
    html.root_element()
        .descendants()
        .filter(|node| node.value().as_text().is_some_and(|text| PRICE_TEXT.is_match(text)))
        .filter_map(|node| node.parent().and_then(ElementRef::wrap))
        .filter(|parent| !matches!(parent.value().name(), "script" | "style" | "noscript"))
        .filter(|parent| seen.insert(parent.id()))
        .collect()
}

/// Number of price-text parents in a raw document.
pub fn count_price_text_parents(html: &str) -> usize {
    price_text_parents(&Html::parse_document(html)).len()
}

/// Compile a selector list, skipping invalid entries. Fails only when
/// nothing compiles.
pub(crate) fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<(String, Selector)>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push((selector_str.clone(), selector)),
            Err(e) => {
                warn!("Failed to compile {} selector '{}': {}", field, selector_str, e);
                errors.push(format!("'{selector_str}': {e}"));
            }
        }
    }

    if selectors.is_empty() {
        return Err(ParsingError::configuration(
            field,
            format!("No valid selectors compiled. Errors: {}", errors.join(", ")),
        ));
    }

    if !errors.is_empty() {
        debug!("Some {} selectors failed to compile: {}", field, errors.join(", "));
    }

    Ok(selectors)
}

/// Outcome of parsing one results page.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub records: Vec<ProductRecord>,
    /// Candidate nodes examined (after the per-page cap)
    pub nodes_seen: usize,
    /// Nodes dropped for a missing title or price
    pub malformed: usize,
    /// Nodes whose extraction failed outright
    pub failures: usize,
    /// Selector that located the containers, if any did
    pub container_selector: Option<String>,
}

impl ExtractionReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parser for extracting listings from search results pages
#[derive(Debug)]
pub struct ProductListParser {
    container_selectors: Vec<(String, Selector)>,
    fallback_link_selector: Selector,
    extractor: ItemExtractor,
    max_items_per_page: usize,
}

impl ProductListParser {
    /// Create a parser with the default selector configuration
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&ExtractionConfig::default())
    }

    pub fn with_config(config: &ExtractionConfig) -> ParsingResult<Self> {
        Self::with_extractor(config, ItemExtractor::from_config(config)?)
    }

    /// Create a parser around an already configured item extractor
    pub fn with_extractor(config: &ExtractionConfig, extractor: ItemExtractor) -> ParsingResult<Self> {
        let fallback_link_selector = Selector::parse(&config.fallback_link_selector)
            .map_err(|e| ParsingError::invalid_selector(&config.fallback_link_selector, e))?;
        Ok(Self {
            container_selectors: compile_selectors("container_selectors", &config.container_selectors)?,
            fallback_link_selector,
            extractor,
            max_items_per_page: config.max_items_per_page,
        })
    }

    pub fn container_selectors(&self) -> impl Iterator<Item = &str> {
        self.container_selectors.iter().map(|(s, _)| s.as_str())
    }

    pub const fn extractor(&self) -> &ItemExtractor {
        &self.extractor
    }

    /// Parse raw HTML; the document never leaves this call.
    pub fn parse_html(&self, html: &str, context: &ParseContext) -> ParsingResult<ExtractionReport> {
        let document = Html::parse_document(html);
        self.parse_with_context(&document, context)
    }

    /// Candidate item nodes and the selector that found them.
    fn locate_items<'a>(&self, html: &'a Html) -> (Vec<ElementRef<'a>>, Option<String>) {
        for (label, selector) in &self.container_selectors {
            let nodes: Vec<ElementRef<'a>> = html.select(selector).collect();
            if !nodes.is_empty() {
                debug!("Found {} containers using selector {}", nodes.len(), label);
                return (nodes, Some(label.clone()));
            }
        }

        let mut seen = HashSet::new();
        let parents: Vec<ElementRef<'a>> = html
            .select(&self.fallback_link_selector)
            .filter_map(|link| link.parent().and_then(ElementRef::wrap))
            .filter(|parent| seen.insert(parent.id()))
            .collect();
        if !parents.is_empty() {
            info!(
                "No container selector matched, using parents of {} item links",
                parents.len()
            );
            return (parents, Some(FALLBACK_CONTAINER_LABEL.to_string()));
        }

        let parents = price_text_parents(html);
        if parents.is_empty() {
            (parents, None)
        } else {
            info!("No item links either, using parents of {} price texts", parents.len());
            (parents, Some(FALLBACK_PRICE_LABEL.to_string()))
        }
    }
}

impl ContextualParser for ProductListParser {
    type Output = ExtractionReport;
    type Context = ParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> ParsingResult<Self::Output> {
        let (nodes, container_selector) = self.locate_items(html);
        let mut report = ExtractionReport {
            container_selector,
            ..ExtractionReport::default()
        };

        if nodes.is_empty() {
            warn!("No item containers on {}", context.describe());
            return Ok(report);
        }

        let mut ids = HashSet::new();
        for (index, node) in nodes.into_iter().take(self.max_items_per_page).enumerate() {
            report.nodes_seen += 1;
            match self.extractor.extract(node, index, context) {
                Ok(Some(mut record)) => {
                    if !ids.insert(record.id.clone()) {
                        let fresh = Uuid::new_v4().to_string();
                        debug!("Duplicate id {} on {}, reassigned {}", record.id, context.describe(), fresh);
                        ids.insert(fresh.clone());
                        record.id = fresh;
                    }
                    report.records.push(record);
                }
                Ok(None) => {
                    report.malformed += 1;
                }
                Err(e) => {
                    report.failures += 1;
                    error!("Failed to extract item at index {} on {}: {}", index, context.describe(), e);
                }
            }
        }

        info!(
            "{}: {} records from {} nodes ({} malformed, {} failed)",
            context.describe(),
            report.records.len(),
            report.nodes_seen,
            report.malformed,
            report.failures
        );
        Ok(report)
    }
}
