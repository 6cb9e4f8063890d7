//! Item extractor: builds one `ProductRecord` from one candidate node.

use chrono::Utc;
use scraper::ElementRef;
use tracing::debug;
use uuid::Uuid;

use super::config::{ExtractionConfig, FieldKind};
use super::selector_chain::{SelectorChainResolver, parse_item_id};
use super::{ParseContext, ParsingError, ParsingResult};
use crate::domain::category::normalize_category;
use crate::domain::product::{Condition, ProductRecord};

#[derive(Debug)]
pub struct ItemExtractor {
    resolver: SelectorChainResolver,
    placeholder_image: String,
    max_node_text_len: usize,
}

impl ItemExtractor {
    pub fn from_config(config: &ExtractionConfig) -> ParsingResult<Self> {
        Ok(Self::new(SelectorChainResolver::from_config(config)?, config))
    }

    pub fn new(resolver: SelectorChainResolver, config: &ExtractionConfig) -> Self {
        Self {
            resolver,
            placeholder_image: config.placeholder_image.clone(),
            max_node_text_len: config.max_node_text_len,
        }
    }

    pub const fn resolver(&self) -> &SelectorChainResolver {
        &self.resolver
    }

    /// Extract a record from `node`.
    ///
    /// `Ok(None)` means the node lacks a title or a positive price and was
    /// dropped as malformed. `Err` means the node could not be examined at
    /// all; either way sibling nodes are unaffected.
    pub fn extract(
        &self,
        node: ElementRef<'_>,
        index: usize,
        ctx: &ParseContext,
    ) -> ParsingResult<Option<ProductRecord>> {
        let text_len: usize = node.text().map(str::len).sum();
        if text_len > self.max_node_text_len {
            return Err(ParsingError::node_extraction_failed(
                index,
                format!("node text is {text_len} bytes, larger than an item card"),
            ));
        }

        let title = self
            .resolver
            .resolve(FieldKind::Title, node)
            .and_then(|v| v.into_text());
        let price = self
            .resolver
            .resolve(FieldKind::Price, node)
            .and_then(|v| v.as_price());

        let (Some(title), Some(price)) = (title, price) else {
            debug!(
                "Page {} node {} dropped: title or price unresolved",
                ctx.page_number, index
            );
            return Ok(None);
        };

        let link = self
            .resolver
            .resolve(FieldKind::Link, node)
            .and_then(|v| v.into_text());
        let markup_id = self
            .resolver
            .resolve(FieldKind::ItemId, node)
            .and_then(|v| v.into_text())
            .or_else(|| link.as_deref().and_then(parse_item_id));

        let source_url = link.or_else(|| {
            markup_id
                .as_ref()
                .map(|id| format!("{}/item/{}", ctx.base_url.trim_end_matches('/'), id))
        });
        let id = markup_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let image_url = self
            .resolver
            .resolve(FieldKind::Image, node)
            .and_then(|v| v.into_text())
            .unwrap_or_else(|| {
                debug!("Node {} has no CDN image, using placeholder", index);
                self.placeholder_image.clone()
            });

        let condition = self
            .resolver
            .resolve(FieldKind::Condition, node)
            .and_then(|v| v.as_condition())
            .unwrap_or(Condition::Unknown);
        let seller_rating = self
            .resolver
            .resolve(FieldKind::Rating, node)
            .and_then(|v| v.as_rating());
        let category = self
            .resolver
            .resolve(FieldKind::Category, node)
            .and_then(|v| v.into_text())
            .unwrap_or_default();
        let brand = self
            .resolver
            .resolve(FieldKind::Brand, node)
            .and_then(|v| v.into_text())
            .filter(|b| !b.eq_ignore_ascii_case("unknown"));
        let description = self
            .resolver
            .resolve(FieldKind::Description, node)
            .and_then(|v| v.into_text());

        Ok(Some(ProductRecord {
            id,
            title,
            price,
            condition,
            seller_rating,
            category: normalize_category(&category),
            brand,
            image_url,
            source_url,
            description,
            tags: Vec::new(),
            score: None,
            scraped_at: Utc::now(),
        }))
    }
}
