//! Domain module - listing records, query model and collaborator interfaces
//!
//! Each module is its own file in the domain/ directory; commonly used items
//! are re-exported here.

pub mod category;
pub mod product;
pub mod query;
pub mod repositories;

pub use category::normalize_category;
pub use product::{Condition, ProductDetail, ProductRecord};
pub use query::{BrandFilter, FilterSet, PriceRange, QueryInput};
pub use repositories::ProductSink;
