//! Parsing error re-export
//!
//! Parsers inside this module refer to errors through `super::error`.

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
