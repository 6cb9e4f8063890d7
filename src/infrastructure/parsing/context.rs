//! Parsing context for listing extraction
//!
//! Carries per-page state through the item extractor.

use std::collections::HashMap;

/// Context information for one results page
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Results page being parsed (1-based)
    pub page_number: u32,

    /// Base URL for resolving relative links
    pub base_url: String,

    /// Search text that produced the page
    pub query: String,

    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl ParseContext {
    pub fn new(page_number: u32, base_url: impl Into<String>) -> Self {
        Self {
            page_number,
            base_url: base_url.into(),
            query: String::new(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Add metadata to context
    #[must_use]
    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Address of the document being parsed, when the caller recorded it
    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").map(String::as_str)
    }

    /// Short label for log lines
    pub fn describe(&self) -> String {
        let url = self.url().unwrap_or("-");
        if self.query.is_empty() {
            format!("page {} ({})", self.page_number, url)
        } else {
            format!("page {} of '{}' ({})", self.page_number, self.query, url)
        }
    }
}
