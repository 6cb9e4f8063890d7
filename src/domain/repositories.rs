//! Interfaces for the collaborators that consume pipeline output.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::product::ProductRecord;

/// Persistence boundary for ranked, tagged records.
///
/// The pipeline makes no assumption about success and never retries on the
/// sink's behalf; a failure is logged and counted.
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Store a batch and return how many records were accepted.
    async fn store(&self, records: &[ProductRecord]) -> Result<usize>;
}
