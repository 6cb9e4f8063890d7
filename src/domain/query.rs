//! Query input produced by the natural-language interpretation collaborator.

use serde::{Deserialize, Serialize};

use super::product::{Condition, ProductRecord};

/// Inclusive price bounds in yen. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PriceRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl PriceRange {
    pub const fn contains(&self, price: u64) -> bool {
        let above_min = match self.min {
            Some(min) => price >= min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) => price <= max,
            None => true,
        };
        above_min && below_max
    }
}

/// Brand filter accepted either as a single string or as a list.
///
/// Both forms have match-any-of semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BrandFilter {
    Single(String),
    AnyOf(Vec<String>),
}

impl BrandFilter {
    pub fn brands(&self) -> Vec<&str> {
        match self {
            Self::Single(brand) => vec![brand.as_str()],
            Self::AnyOf(brands) => brands.iter().map(String::as_str).collect(),
        }
    }

    /// Case-insensitive exact match against any listed brand.
    pub fn matches(&self, brand: &str) -> bool {
        let brand = brand.trim();
        !brand.is_empty()
            && self
                .brands()
                .iter()
                .any(|candidate| candidate.trim().eq_ignore_ascii_case(brand))
    }

    pub fn is_empty(&self) -> bool {
        self.brands().iter().all(|b| b.trim().is_empty())
    }
}

impl From<&str> for BrandFilter {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterSet {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "priceRange")]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub brand: Option<BrandFilter>,
}

impl FilterSet {
    pub fn brand_matches(&self, record: &ProductRecord) -> bool {
        match (&self.brand, record.brand.as_deref()) {
            (Some(filter), Some(brand)) => filter.matches(brand),
            _ => false,
        }
    }

    pub fn category_matches(&self, record: &ProductRecord) -> bool {
        self.category.as_deref().is_some_and(|category| {
            !category.trim().is_empty() && category.trim().eq_ignore_ascii_case(record.category.trim())
        })
    }
}

/// Structured search request: keywords plus optional filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryInput {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub filters: FilterSet,
}

impl QueryInput {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            filters: FilterSet::default(),
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    /// Keywords joined into the search-box string.
    pub fn search_text(&self) -> String {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lower-cased, non-empty keywords used for relevance scoring.
    pub fn normalized_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}
