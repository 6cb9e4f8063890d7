//! Parsing configuration for listing extraction
//!
//! Selector chains are plain data so the precedence order can be edited in the
//! config file when the marketplace markup drifts.

use serde::{Deserialize, Serialize};

use crate::infrastructure::config::marketplace;

/// Semantic field resolved from an item node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    ItemId,
    Title,
    Price,
    Image,
    Condition,
    Rating,
    Category,
    Brand,
    Link,
    Description,
}

impl FieldKind {
    pub const ALL: [Self; 10] = [
        Self::ItemId,
        Self::Title,
        Self::Price,
        Self::Image,
        Self::Condition,
        Self::Rating,
        Self::Category,
        Self::Brand,
        Self::Link,
        Self::Description,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ItemId => "item_id",
            Self::Title => "title",
            Self::Price => "price",
            Self::Image => "image",
            Self::Condition => "condition",
            Self::Rating => "rating",
            Self::Category => "category",
            Self::Brand => "brand",
            Self::Link => "link",
            Self::Description => "description",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extraction strategy in a field's fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Attribute of the first element matching `selector` (the node itself
    /// counts when it matches).
    Attribute { selector: String, attribute: String },
    /// Text of the first descendant matching `selector`.
    CssText { selector: String },
    /// Regex over the node's full text; capture group 1 when present.
    TextPattern { pattern: String },
    /// First plausible free-text label found under the given tags.
    GenericTag {
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl StrategySpec {
    pub fn attribute(selector: &str, attribute: &str) -> Self {
        Self::Attribute {
            selector: selector.to_string(),
            attribute: attribute.to_string(),
        }
    }

    pub fn css_text(selector: &str) -> Self {
        Self::CssText {
            selector: selector.to_string(),
        }
    }

    pub fn text_pattern(pattern: &str) -> Self {
        Self::TextPattern {
            pattern: pattern.to_string(),
        }
    }

    pub fn generic_tag(tags: &[&str]) -> Self {
        Self::GenericTag {
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

/// Ordered strategy lists per semantic field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorChains {
    pub item_id: Vec<StrategySpec>,
    pub title: Vec<StrategySpec>,
    pub price: Vec<StrategySpec>,
    pub image: Vec<StrategySpec>,
    pub condition: Vec<StrategySpec>,
    pub rating: Vec<StrategySpec>,
    pub category: Vec<StrategySpec>,
    pub brand: Vec<StrategySpec>,
    pub link: Vec<StrategySpec>,
    pub description: Vec<StrategySpec>,
}

impl SelectorChains {
    pub fn chain(&self, field: FieldKind) -> &[StrategySpec] {
        match field {
            FieldKind::ItemId => &self.item_id,
            FieldKind::Title => &self.title,
            FieldKind::Price => &self.price,
            FieldKind::Image => &self.image,
            FieldKind::Condition => &self.condition,
            FieldKind::Rating => &self.rating,
            FieldKind::Category => &self.category,
            FieldKind::Brand => &self.brand,
            FieldKind::Link => &self.link,
            FieldKind::Description => &self.description,
        }
    }
}

impl Default for SelectorChains {
    fn default() -> Self {
        use StrategySpec as S;
        Self {
            item_id: vec![
                S::attribute("[data-item-id]", "data-item-id"),
                S::attribute("a[href*='/item/']", "href"),
                S::css_text("[data-testid='item-id']"),
                S::css_text(".item-id"),
            ],
            title: vec![
                S::attribute("mer-item-thumbnail", "item-name"),
                S::css_text("[data-testid='thumbnail-item-name']"),
                S::css_text("[data-testid='item-name']"),
                S::css_text("[data-testid='product-name']"),
                S::css_text("[data-testid='title']"),
                S::css_text(".item-name"),
                S::css_text(".product-name"),
                S::css_text(".title"),
                S::css_text("h1, h2, h3, h4, h5, h6"),
                S::css_text("[class*='name']"),
                S::css_text("[class*='title']"),
                S::generic_tag(&["span", "p", "div", "a"]),
            ],
            price: vec![
                S::attribute("mer-item-thumbnail", "price"),
                S::attribute("[data-price]", "data-price"),
                S::css_text("[data-testid='price']"),
                S::css_text("[data-testid='item-price']"),
                S::css_text(".price"),
                S::css_text(".item-price"),
                S::css_text(".product-price"),
                S::css_text("[class*='price']"),
                S::text_pattern(r"[¥￥]\s*([0-9][0-9,]*)"),
            ],
            image: vec![
                S::attribute("img[src*='static.mercdn.net']", "src"),
                S::attribute("img[src*='mercdn.net']", "src"),
                S::attribute("img[data-src*='static.mercdn.net']", "data-src"),
                S::attribute("img[data-src*='mercdn.net']", "data-src"),
                S::attribute("img[src*='mercari']", "src"),
                S::attribute("img[data-src*='mercari']", "data-src"),
                S::attribute("mer-item-thumbnail", "src"),
                S::attribute("img[src]", "src"),
                S::attribute("img[data-src]", "data-src"),
                S::attribute("img[data-lazy-src]", "data-lazy-src"),
                S::attribute("img[data-original]", "data-original"),
            ],
            condition: vec![
                S::css_text("[data-testid='condition']"),
                S::css_text(".condition"),
                S::css_text(".item-condition"),
                S::attribute("[data-condition]", "data-condition"),
                S::text_pattern(
                    "(新品、未使用|新品|未使用に近い|目立った傷や汚れなし|やや傷や汚れあり|傷や汚れあり|全体的に状態が悪い)",
                ),
            ],
            rating: vec![
                S::attribute("[data-rating]", "data-rating"),
                S::css_text("[data-testid='seller-rating']"),
                S::css_text(".seller-rating"),
                S::css_text(".rating"),
            ],
            category: vec![
                S::attribute("[data-category]", "data-category"),
                S::css_text("[data-testid='category']"),
                S::css_text(".category"),
                S::css_text(".item-category"),
            ],
            brand: vec![
                S::attribute("[data-brand]", "data-brand"),
                S::css_text("[data-testid='brand']"),
                S::css_text(".brand"),
                S::css_text(".item-brand"),
            ],
            link: vec![
                S::attribute("a[data-testid='thumbnail-link']", "href"),
                S::attribute("a[href*='/item/']", "href"),
            ],
            description: vec![
                S::css_text("[data-testid='description']"),
                S::css_text(".item-description"),
                S::css_text(".description"),
            ],
        }
    }
}

/// Listing extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL for resolving relative links
    pub base_url: String,

    /// Item container selectors, most specific first. Also used by the page
    /// fetcher to decide that a results page has loaded.
    pub container_selectors: Vec<String>,

    /// Links whose parents are used as containers when no selector matches
    pub fallback_link_selector: String,

    /// Item page roots, most specific first. The first match is both the
    /// readiness signal and the node the field chains run on.
    pub detail_container_selectors: Vec<String>,

    /// Upper bound on item nodes examined per page
    pub max_items_per_page: usize,

    /// Nodes with more text than this are page wrappers, not items
    pub max_node_text_len: usize,

    /// Host fragments accepted for listing images
    pub image_hosts: Vec<String>,

    /// Image reference used when no acceptable image is found
    pub placeholder_image: String,

    pub selectors: SelectorChains,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self {
            base_url: marketplace::BASE_URL.to_string(),
            container_selectors: [
                "li[data-testid='item-cell']",
                "[data-testid='item-cell']",
                "[data-testid='search-item']",
                "[data-testid='item']",
                "[data-testid='product-item']",
                ".item-cell",
                ".search-item",
                ".mercari-item",
                ".product-item",
                ".product-card",
                ".item-card",
                "li[data-testid*='item']",
                "div[data-testid*='item']",
                ".search-result-item",
                "article",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            fallback_link_selector: "a[href*='/item/']".to_string(),
            detail_container_selectors: ["[data-testid='item-detail']", "#item-info", "main", "body"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_items_per_page: defaults::MAX_ITEMS_PER_PAGE,
            max_node_text_len: defaults::MAX_NODE_TEXT_LEN,
            image_hosts: marketplace::IMAGE_HOSTS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            placeholder_image: marketplace::PLACEHOLDER_IMAGE_URL.to_string(),
            selectors: SelectorChains::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_field_has_a_default_chain() {
        let chains = SelectorChains::default();
        for field in FieldKind::ALL {
            assert!(!chains.chain(field).is_empty(), "{field} chain is empty");
        }
    }

    #[test]
    fn test_strategy_spec_serde_shape() {
        let json = r#"[
            {"strategy": "attribute", "selector": "img", "attribute": "src"},
            {"strategy": "css_text", "selector": ".price"},
            {"strategy": "text_pattern", "pattern": "¥([0-9,]+)"},
            {"strategy": "generic_tag"}
        ]"#;
        let specs: Vec<StrategySpec> = serde_json::from_str(json).unwrap();
        assert_eq!(specs[0], StrategySpec::attribute("img", "src"));
        assert_eq!(specs[1], StrategySpec::css_text(".price"));
        assert_eq!(specs[3], StrategySpec::GenericTag { tags: Vec::new() });
    }

    #[test]
    fn test_partial_extraction_config_uses_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"max_items_per_page": 5}"#).unwrap();
        assert_eq!(config.max_items_per_page, 5);
        assert_eq!(config.selectors, SelectorChains::default());
        assert!(!config.container_selectors.is_empty());
    }
}
