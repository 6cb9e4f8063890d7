//! Search URL construction

use url::Url;

use super::FetchError;
use crate::domain::query::FilterSet;
use crate::infrastructure::config::marketplace;

/// Builds marketplace search URLs with the fixed sort/status parameters.
#[derive(Debug, Clone)]
pub struct SearchUrlBuilder {
    search_url: Url,
}

impl SearchUrlBuilder {
    pub fn new(search_url: &str) -> Result<Self, FetchError> {
        let search_url = Url::parse(search_url).map_err(|e| {
            FetchError::SessionUnavailable(format!("invalid search url '{search_url}': {e}"))
        })?;
        Ok(Self { search_url })
    }

    /// `page` is 1-based; the first page carries no page parameter.
    pub fn build(&self, keyword: &str, filters: &FilterSet, page: u32) -> Url {
        let mut url = self.search_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("keyword", keyword.trim())
                .append_pair("sort", marketplace::SORT)
                .append_pair("order", marketplace::ORDER)
                .append_pair("status", marketplace::STATUS);

            if let Some(category) = filters
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            {
                pairs.append_pair("category", &category.to_lowercase());
            }
            if let Some(range) = filters.price_range {
                if let Some(min) = range.min {
                    pairs.append_pair("price_min", &min.to_string());
                }
                if let Some(max) = range.max {
                    pairs.append_pair("price_max", &max.to_string());
                }
            }
            if let Some(condition) = filters.condition {
                pairs.append_pair("condition", condition.as_str());
            }
            if page > 1 {
                pairs.append_pair("page", &page.to_string());
            }
        }
        url
    }
}
