use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listing condition as shown on the marketplace item card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    VeryGood,
    Good,
    Acceptable,
    #[default]
    Unknown,
}

impl Condition {
    /// Ordered so that more specific labels are tested before the generic
    /// ones they contain ("very good" before "good", "like new" before "new").
    const TEXT_PATTERNS: &'static [(&'static str, Condition)] = &[
        ("未使用に近い", Condition::LikeNew),
        ("ほぼ新品", Condition::LikeNew),
        ("like new", Condition::LikeNew),
        ("like-new", Condition::LikeNew),
        ("like_new", Condition::LikeNew),
        ("新品", Condition::New),
        ("未使用", Condition::New),
        ("目立った傷や汚れなし", Condition::VeryGood),
        ("良好", Condition::VeryGood),
        ("very good", Condition::VeryGood),
        ("very-good", Condition::VeryGood),
        ("very_good", Condition::VeryGood),
        ("やや傷や汚れあり", Condition::Good),
        ("全体的に状態が悪い", Condition::Acceptable),
        ("傷や汚れあり", Condition::Acceptable),
        ("acceptable", Condition::Acceptable),
        ("fair", Condition::Acceptable),
        ("good", Condition::Good),
        ("new", Condition::New),
        ("可", Condition::Acceptable),
    ];

    /// Map a free-text condition label (English or Japanese) to a condition.
    /// Returns `None` when the text carries no recognisable label.
    pub fn from_text(text: &str) -> Option<Self> {
        let lowered = text.trim().to_lowercase();
        if lowered.is_empty() {
            return None;
        }
        Self::TEXT_PATTERNS
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map(|(_, condition)| *condition)
    }

    /// Ranking sub-score for this condition.
    pub const fn score(self) -> f64 {
        match self {
            Self::New => 1.0,
            Self::LikeNew => 0.9,
            Self::VeryGood => 0.8,
            Self::Good => 0.7,
            Self::Acceptable | Self::Unknown => 0.5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::LikeNew => "like_new",
            Self::VeryGood => "very_good",
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::Unknown => "unknown",
        }
    }

    /// Human readable label used for quality tags.
    pub const fn tag_label(self) -> Option<&'static str> {
        match self {
            Self::New => Some("brand new"),
            Self::LikeNew => Some("like new"),
            Self::VeryGood => Some("excellent condition"),
            Self::Good => Some("good condition"),
            Self::Acceptable => Some("fair condition"),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical listing extracted from one search results page.
///
/// Records are created fresh per extraction pass. Ranking and tagging hand
/// back copies with `score` / `tags` attached instead of mutating the input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    /// Price in minor currency units (yen).
    pub price: u64,
    pub condition: Condition,
    /// `None` when the listing did not expose a rating.
    #[serde(rename = "sellerRating")]
    pub seller_rating: Option<f32>,
    pub category: String,
    pub brand: Option<String>,
    /// Validated CDN URL or the placeholder reference; never empty.
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Batch-relative composite score, only meaningful inside the ranking
    /// call that produced it.
    #[serde(default, skip_deserializing)]
    pub score: Option<f64>,
    #[serde(rename = "scrapedAt")]
    pub scraped_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Seller rating clamped into the valid `[0, 5]` range.
    pub fn rating(&self) -> Option<f32> {
        self.seller_rating.map(|r| r.clamp(0.0, 5.0))
    }

    pub fn with_score(&self, score: f64) -> Self {
        Self {
            score: Some(score),
            ..self.clone()
        }
    }

    pub fn with_tags(&self, tags: Vec<String>) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }

    /// Lower-cased text searched by keyword relevance.
    pub fn search_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.category,
            self.brand.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// Fields read from a listing's own item page.
///
/// Every field is optional; only what the item page exposed is merged back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    pub id: Option<String>,
    pub title: Option<String>,
    pub price: Option<u64>,
    pub condition: Option<Condition>,
    pub seller_rating: Option<f32>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl ProductDetail {
    pub const fn is_empty(&self) -> bool {
        self.condition.is_none()
            && self.seller_rating.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.description.is_none()
    }
}

impl ProductRecord {
    /// Fill gaps from the item page. Values the search card already had win;
    /// returns the number of fields filled.
    pub fn apply_detail(&mut self, detail: &ProductDetail) -> usize {
        let mut filled = 0;
        if self.description.is_none() {
            if let Some(description) = &detail.description {
                self.description = Some(description.clone());
                filled += 1;
            }
        }
        if self.brand.is_none() {
            if let Some(brand) = &detail.brand {
                self.brand = Some(brand.clone());
                filled += 1;
            }
        }
        if self.category.is_empty() || self.category == crate::domain::category::OTHER {
            if let Some(category) = &detail.category {
                self.category = category.clone();
                filled += 1;
            }
        }
        if self.condition == Condition::Unknown {
            if let Some(condition) = detail.condition {
                self.condition = condition;
                filled += 1;
            }
        }
        if self.seller_rating.is_none() && detail.seller_rating.is_some() {
            self.seller_rating = detail.seller_rating;
            filled += 1;
        }
        filled
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Condition, ProductRecord};

    /// Minimal record for tests in this crate.
    pub fn record(id: &str, title: &str, price: u64) -> ProductRecord {
        ProductRecord {
            id: id.to_string(),
            title: title.to_string(),
            price,
            condition: Condition::Unknown,
            seller_rating: None,
            category: "Electronics".to_string(),
            brand: None,
            image_url: "https://static.mercdn.net/item/detail/orig/photos/m1_1.jpg".to_string(),
            source_url: None,
            description: None,
            tags: Vec::new(),
            score: None,
            scraped_at: chrono::Utc::now(),
        }
    }
}
