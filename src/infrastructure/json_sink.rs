//! JSON-lines product sink
//!
//! Appends one serialized record per line. Used by the scheduled binary in
//! place of a database collaborator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::domain::product::ProductRecord;
use crate::domain::repositories::ProductSink;

#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProductSink for JsonLinesSink {
    async fn store(&self, records: &[ProductRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record).context("Failed to serialize record")?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(buffer.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        file.flush().await?;

        info!("Stored {} records in {}", records.len(), self.path.display());
        Ok(records.len())
    }
}
