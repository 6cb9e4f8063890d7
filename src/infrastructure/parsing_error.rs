//! Parsing error types for listing extraction
//!
//! Errors local to one strategy or one node are recoverable and never abort
//! a page; only configuration errors are surfaced to the caller.

use thiserror::Error;

use crate::infrastructure::parsing::config::FieldKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid text pattern: {pattern} - {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No usable strategy configured for field '{field}'")]
    EmptyStrategyChain { field: FieldKind },

    #[error("Strategy '{strategy}' failed for field '{field}': {reason}")]
    FieldExtractionFailed {
        field: FieldKind,
        strategy: String,
        reason: String,
    },

    #[error("Item node {index} could not be extracted: {reason}")]
    NodeExtractionFailed { index: usize, reason: String },

    #[error("Item node {index} is missing required fields: {}", missing.join(", "))]
    MalformedRecord { index: usize, missing: Vec<String> },

    #[error("URL resolution failed: {url} - {reason}")]
    UrlResolutionFailed {
        url: String,
        reason: String,
        base_url: Option<String>,
    },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String, field: String },
}

impl ParsingError {
    pub fn invalid_selector(selector: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_pattern(pattern: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn field_extraction_failed(field: FieldKind, strategy: &str, reason: &str) -> Self {
        Self::FieldExtractionFailed {
            field,
            strategy: strategy.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn node_extraction_failed(index: usize, reason: impl Into<String>) -> Self {
        Self::NodeExtractionFailed {
            index,
            reason: reason.into(),
        }
    }

    pub fn url_resolution_failed(url: &str, reason: impl std::fmt::Display, base_url: Option<&str>) -> Self {
        Self::UrlResolutionFailed {
            url: url.to_string(),
            reason: reason.to_string(),
            base_url: base_url.map(ToString::to_string),
        }
    }

    pub fn configuration(field: &str, message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            field: field.to_string(),
        }
    }

    /// Check if this error is recoverable
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidSelector { .. }
            | Self::InvalidPattern { .. }
            | Self::FieldExtractionFailed { .. }
            | Self::NodeExtractionFailed { .. }
            | Self::MalformedRecord { .. }
            | Self::UrlResolutionFailed { .. } => true,
            Self::EmptyStrategyChain { .. } | Self::ConfigurationError { .. } => false,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
