//! Tag enrichment engine
//!
//! Tags come from independent sources appended in a fixed order: title and
//! category keywords, price tier, value relative to the rest of the batch,
//! quality signals, and category-specific labels. The cleaned list is
//! lower-cased, deduplicated, free of denylisted filler phrases and capped.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

use crate::domain::product::ProductRecord;
use crate::infrastructure::config::TaggingConfig;

const PRODUCT_KEYWORDS: &[&str] = &[
    // electronics
    "iphone", "macbook", "ipad", "airpods", "nintendo", "switch", "playstation", "xbox", "sony",
    "canon", "nikon",
    // fashion
    "uniqlo", "supreme", "champion", "louis vuitton", "chanel", "fendi", "rolex",
    // gaming
    "pokemon", "duel masters",
    // collectibles
    "figures", "cards", "trading cards", "pop", "megahouse",
];

const SIZE_WORDS: &[&str] = &["xs", "s", "m", "l", "xl", "xxl", "small", "medium", "large"];

const COLOR_WORDS: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "pink", "purple", "gray", "brown",
];

const PREMIUM_BRANDS: &[&str] = &["apple", "sony", "nintendo", "rolex", "chanel", "louis vuitton", "fendi"];

/// Neutral rewrites for filler phrases found in narrative text
const PHRASE_REPLACEMENTS: &[(&str, &str)] = &[
    ("budget friendly brand", "budget friendly"),
    ("brand affordable", "affordable prices"),
    ("affordable brand", "affordable prices"),
    ("cheap brand", "affordable prices"),
    ("budget brand", "affordable prices"),
    ("value brand", "good value"),
    ("economic brand", "affordable prices"),
    ("inexpensive brand", "affordable prices"),
    ("low cost brand", "affordable prices"),
    ("discount brand", "discounted price"),
];

static PHRASE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    PHRASE_REPLACEMENTS
        .iter()
        .map(|(phrase, replacement)| {
            let pattern = RegexBuilder::new(&regex::escape(phrase))
                .case_insensitive(true)
                .build()
                .expect("escaped literal is a valid regex");
            (pattern, *replacement)
        })
        .collect()
});

/// Rewrite denylisted filler phrases inside free text, case-insensitively.
pub fn scrub_generic_phrases(text: &str) -> String {
    PHRASE_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub average: f64,
    pub min: u64,
    pub max: u64,
}

/// Tag statistics across a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagSummary {
    pub total_products: usize,
    pub unique_tags: usize,
    /// Up to five `(tag, count)` pairs, most frequent first
    pub most_common_tags: Vec<(String, usize)>,
    pub price_stats: PriceStats,
}

#[derive(Debug, Clone, Default)]
pub struct TagEnricher {
    config: TaggingConfig,
}

impl TagEnricher {
    pub const fn new(config: TaggingConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &TaggingConfig {
        &self.config
    }

    /// Whether `text` contains any denylisted phrase
    pub fn is_denylisted(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.config
            .denylist
            .iter()
            .any(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
    }

    /// Tags for one record. `batch` supplies the relative-value comparison;
    /// records sharing `record.id` are excluded from the average.
    pub fn enrich(&self, record: &ProductRecord, batch: &[ProductRecord]) -> Vec<String> {
        let mut tags = Vec::new();
        self.basic_tags(record, &mut tags);
        self.pricing_tags(record, batch, &mut tags);
        self.quality_tags(record, &mut tags);
        Self::category_tags(record, &mut tags);
        self.clean(tags)
    }

    /// Copies of `records` with tags attached
    pub fn enrich_batch(&self, records: &[ProductRecord]) -> Vec<ProductRecord> {
        records
            .iter()
            .map(|record| record.with_tags(self.enrich(record, records)))
            .collect()
    }

    fn basic_tags(&self, record: &ProductRecord, tags: &mut Vec<String>) {
        let category = record.category.trim().to_lowercase();
        if !category.is_empty() {
            let variation = if category.contains("electronics") {
                Some("tech")
            } else if category.contains("fashion") {
                Some("clothing")
            } else if category.contains("entertainment") || category.contains("gaming") {
                Some("games")
            } else {
                None
            };
            tags.push(category);
            tags.extend(variation.map(str::to_string));
        }

        if let Some(brand) = record.brand.as_deref().map(str::to_lowercase) {
            if !self.is_denylisted(&brand) {
                tags.push(brand);
            }
        }

        let title = record.title.to_lowercase();
        let words: Vec<&str> = title.split_whitespace().collect();
        for keyword in PRODUCT_KEYWORDS {
            let found = if keyword.contains(' ') {
                title.contains(keyword)
            } else {
                words.contains(keyword)
            };
            if found {
                tags.push((*keyword).to_string());
            }
        }
        for word in &words {
            if SIZE_WORDS.contains(word) {
                tags.push(format!("size {word}"));
            } else if COLOR_WORDS.contains(word) {
                tags.push((*word).to_string());
            }
        }
    }

    fn pricing_tags(&self, record: &ProductRecord, batch: &[ProductRecord], tags: &mut Vec<String>) {
        let tiers = &self.config.price_tiers;
        let price = record.price;
        let tier: &[&str] = if price <= tiers.very_affordable {
            &["very affordable", "budget friendly"]
        } else if price <= tiers.affordable {
            &["affordable", "good value"]
        } else if price <= tiers.mid_range {
            &["mid range"]
        } else if price <= tiers.premium {
            &["premium"]
        } else {
            &["luxury"]
        };
        tags.extend(tier.iter().map(|t| (*t).to_string()));

        let others: Vec<u64> = batch
            .iter()
            .filter(|other| other.id != record.id)
            .map(|other| other.price)
            .collect();
        if others.is_empty() {
            return;
        }
        let average = others.iter().sum::<u64>() as f64 / others.len() as f64;
        let price = price as f64;
        if price < average * self.config.great_deal_ratio {
            tags.push("great deal".to_string());
        } else if price < average * self.config.good_deal_ratio {
            tags.push("good deal".to_string());
        } else if price > average * self.config.premium_price_ratio {
            tags.push("premium price".to_string());
        }
    }

    fn quality_tags(&self, record: &ProductRecord, tags: &mut Vec<String>) {
        if let Some(label) = record.condition.tag_label() {
            tags.push(label.to_string());
        }

        match record.rating() {
            Some(r) if r >= 4.8 => tags.push("top rated seller".to_string()),
            Some(r) if r >= 4.5 => tags.push("highly rated".to_string()),
            Some(r) if r >= 4.0 => tags.push("well rated".to_string()),
            _ => {}
        }

        let brand = record.brand.as_deref().unwrap_or_default().trim().to_lowercase();
        if PREMIUM_BRANDS.contains(&brand.as_str()) && !self.is_denylisted(&brand) {
            tags.push("premium brand".to_string());
        }
    }

    fn category_tags(record: &ProductRecord, tags: &mut Vec<String>) {
        let category = record.category.to_lowercase();
        let title = record.title.to_lowercase();
        let title_has = |words: &[&str]| words.iter().any(|w| title.contains(w));

        if category.contains("electronics") || title_has(&["iphone", "macbook", "ipad"]) {
            tags.push("latest tech".to_string());
            if title.contains("iphone") {
                tags.push("smartphone".to_string());
            } else if title.contains("macbook") {
                tags.push("laptop".to_string());
            } else if title.contains("ipad") {
                tags.push("tablet".to_string());
            }
        }

        if category.contains("gaming") || title_has(&["nintendo", "switch", "playstation", "xbox"]) {
            tags.push("gaming".to_string());
            if title.contains("switch") {
                tags.push("portable gaming".to_string());
            } else if title_has(&["playstation", "ps5"]) {
                tags.push("console gaming".to_string());
            }
        }

        if category.contains("fashion") {
            tags.push("style".to_string());
            if title_has(&["supreme", "champion", "uniqlo"]) {
                tags.push("streetwear".to_string());
            } else if title_has(&["rolex", "chanel", "louis vuitton"]) {
                tags.push("luxury fashion".to_string());
            }
        }

        if category.contains("collectibles") || title_has(&["figures", "cards", "pokemon"]) {
            tags.push("collectible".to_string());
            if title.contains("pokemon") {
                tags.push("pokemon cards".to_string());
            } else if title.contains("figures") {
                tags.push("anime figures".to_string());
            }
        }
    }

    fn clean(&self, tags: Vec<String>) -> Vec<String> {
        let mut cleaned: Vec<String> = Vec::with_capacity(self.config.max_tags);
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if tag.chars().count() < self.config.min_tag_len {
                continue;
            }
            if self.is_denylisted(&tag) {
                debug!("Dropping filler tag '{}'", tag);
                continue;
            }
            if !cleaned.contains(&tag) {
                cleaned.push(tag);
            }
            if cleaned.len() == self.config.max_tags {
                break;
            }
        }
        cleaned
    }

    /// Tag frequency and price statistics across `records`
    pub fn summarize(&self, records: &[ProductRecord]) -> TagSummary {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut first_seen: Vec<String> = Vec::new();
        for record in records {
            for tag in self.enrich(record, records) {
                let count = counts.entry(tag.clone()).or_insert(0);
                if *count == 0 {
                    first_seen.push(tag);
                }
                *count += 1;
            }
        }

        let mut most_common: Vec<(String, usize)> = first_seen
            .into_iter()
            .map(|tag| {
                let count = counts.get(&tag).copied().unwrap_or_default();
                (tag, count)
            })
            .collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1));
        most_common.truncate(5);

        let prices = records.iter().map(|r| r.price);
        let price_stats = PriceStats {
            average: if records.is_empty() {
                0.0
            } else {
                prices.clone().sum::<u64>() as f64 / records.len() as f64
            },
            min: prices.clone().min().unwrap_or_default(),
            max: prices.max().unwrap_or_default(),
        };

        TagSummary {
            total_products: records.len(),
            unique_tags: counts.len(),
            most_common_tags: most_common,
            price_stats,
        }
    }
}
