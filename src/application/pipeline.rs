//! Scrape pipeline
//!
//! Page fetcher -> item extraction -> ranking and dedup -> item pages for the
//! top listings (optional) -> tag enrichment.
//! One `run` owns one browser session and fetches its pages sequentially;
//! `run_many` parallelizes across queries with one fresh session each.

#![allow(clippy::uninlined_format_args)]

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::ranking::RankingEngine;
use crate::application::tagging::TagEnricher;
use crate::domain::product::ProductRecord;
use crate::domain::query::QueryInput;
use crate::domain::repositories::ProductSink;
use crate::infrastructure::config::{PipelineConfig, ScoutConfig};
use crate::infrastructure::page_fetcher::{FetchError, PageDriver, PageFetcher, cancellable_sleep, jittered};
use crate::infrastructure::parsing::{ParseContext, ParsingError, ProductDetailParser, ProductListParser};

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A browser session could not be created or used at all
    #[error("Session failure: {0}")]
    Session(FetchError),

    #[error("Parser configuration error: {0}")]
    Parser(#[from] ParsingError),

    #[error("Pipeline cancelled")]
    Cancelled,
}

impl From<FetchError> for PipelineError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Cancelled => Self::Cancelled,
            other => Self::Session(other),
        }
    }
}

/// Outcome of one query. Empty `records` is the "no matches" result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub query: String,
    pub records: Vec<ProductRecord>,
    pub pages_fetched: u32,
    /// Pages that timed out, failed to load, or held no items
    pub pages_empty: u32,
    pub nodes_seen: usize,
    pub malformed: usize,
    pub node_failures: usize,
    pub duplicates_removed: usize,
    /// Item pages merged into their listing
    pub details_fetched: usize,
    /// Item pages that failed to load or parse
    pub details_failed: usize,
    /// Records accepted by the sink, when one ran
    pub stored: Option<usize>,
    pub sink_error: Option<String>,
}

impl PipelineReport {
    pub fn is_no_matches(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct ScrapePipeline {
    config: PipelineConfig,
    fetcher: PageFetcher,
    parser: ProductListParser,
    detail_parser: ProductDetailParser,
    ranking: RankingEngine,
    tagging: TagEnricher,
    base_url: String,
    sink: Option<Arc<dyn ProductSink>>,
}

impl std::fmt::Debug for ScrapePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapePipeline")
            .field("config", &self.config)
            .field("base_url", &self.base_url)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl ScrapePipeline {
    pub fn from_config(config: &ScoutConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            config: config.pipeline.clone(),
            fetcher: PageFetcher::new(config.fetcher.clone(), &config.extraction)?,
            parser: ProductListParser::with_config(&config.extraction)?,
            detail_parser: ProductDetailParser::with_config(&config.extraction)?,
            ranking: RankingEngine::new(config.ranking.clone()),
            tagging: TagEnricher::new(config.tagging.clone()),
            base_url: config.extraction.base_url.clone(),
            sink: None,
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProductSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub const fn tagging(&self) -> &TagEnricher {
        &self.tagging
    }

    /// Run one query in one session.
    ///
    /// Page-level failures degrade to empty pages; only an unusable session
    /// or cancellation ends the run with an error.
    pub async fn run(
        &self,
        query: &QueryInput,
        driver: &mut dyn PageDriver,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let keyword = query.search_text();
        let mut report = PipelineReport {
            query: keyword.clone(),
            ..PipelineReport::default()
        };

        self.fetcher.start_session(driver).await?;

        let mut merged: Vec<ProductRecord> = Vec::new();
        let mut seen_ids = HashSet::new();
        for page_number in 1..=self.config.pages_per_query {
            if page_number > 1 {
                let pause = jittered(self.config.page_delay_min_ms, self.config.page_delay_max_ms);
                cancellable_sleep(pause, cancel).await?;
            }

            let page = match self
                .fetcher
                .fetch(driver, &keyword, &query.filters, page_number, cancel)
                .await
            {
                Ok(page) => page,
                Err(e) if e.is_fatal() || e == FetchError::Cancelled => return Err(e.into()),
                Err(e) => {
                    warn!("Page {} of '{}' yielded no items: {}", page_number, keyword, e);
                    report.pages_empty += 1;
                    continue;
                }
            };
            report.pages_fetched += 1;

            let context = ParseContext::new(page_number, self.base_url.clone())
                .with_query(keyword.clone())
                .with_metadata("url".to_string(), page.url.clone());
            let extraction = match self.parser.parse_html(&page.html, &context) {
                Ok(extraction) => extraction,
                Err(e) => {
                    error!("Failed to parse page {} of '{}': {}", page_number, keyword, e);
                    report.pages_empty += 1;
                    continue;
                }
            };

            report.nodes_seen += extraction.nodes_seen;
            report.malformed += extraction.malformed;
            report.node_failures += extraction.failures;
            if extraction.is_empty() {
                report.pages_empty += 1;
            }

            for record in extraction.records {
                if seen_ids.insert(record.id.clone()) {
                    merged.push(record);
                } else {
                    report.duplicates_removed += 1;
                }
            }
        }

        let mut ranked = self.ranking.rank_batch(&merged, query);
        report.duplicates_removed += ranked.duplicates_removed;

        if self.config.detail_pages > 0 {
            self.complete_from_item_pages(driver, &mut ranked.records, &mut report, cancel)
                .await?;
        }

        let mut records = self.tagging.enrich_batch(&ranked.records);
        if self.config.max_results > 0 {
            records.truncate(self.config.max_results);
        }

        if self.config.store_results && !records.is_empty() {
            if let Some(sink) = &self.sink {
                match sink.store(&records).await {
                    Ok(stored) => report.stored = Some(stored),
                    Err(e) => {
                        warn!("Sink rejected {} records for '{}': {:#}", records.len(), keyword, e);
                        report.sink_error = Some(e.to_string());
                    }
                }
            }
        }

        info!(
            "Query '{}': {} records from {} pages ({} empty, {} malformed, {} failed nodes, {} duplicates, {} item pages)",
            keyword,
            records.len(),
            report.pages_fetched,
            report.pages_empty,
            report.malformed,
            report.node_failures,
            report.duplicates_removed,
            report.details_fetched
        );
        report.records = records;
        Ok(report)
    }

    /// Visit the item pages of the first `detail_pages` records and fill the
    /// fields their search cards lacked. A failed item page leaves its record
    /// as it was.
    async fn complete_from_item_pages(
        &self,
        driver: &mut dyn PageDriver,
        records: &mut [ProductRecord],
        report: &mut PipelineReport,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        for record in records.iter_mut().take(self.config.detail_pages) {
            let Some(url) = record.source_url.clone() else {
                debug!("Record {} has no item page link", record.id);
                continue;
            };

            let pause = jittered(self.config.page_delay_min_ms, self.config.page_delay_max_ms);
            cancellable_sleep(pause, cancel).await?;

            let page = match self.fetcher.fetch_detail(driver, &url, cancel).await {
                Ok(page) => page,
                Err(e) if e.is_fatal() || e == FetchError::Cancelled => return Err(e.into()),
                Err(e) => {
                    warn!("Item page {} skipped: {}", url, e);
                    report.details_failed += 1;
                    continue;
                }
            };

            let context = ParseContext::new(0, self.base_url.clone())
                .with_query(report.query.clone())
                .with_metadata("url".to_string(), page.url.clone());
            match self.detail_parser.parse_html(&page.html, &context) {
                Ok(detail) => {
                    let filled = record.apply_detail(&detail);
                    debug!("Item page filled {} fields of {}", filled, record.id);
                    report.details_fetched += 1;
                }
                Err(e) => {
                    warn!("Failed to parse item page {}: {}", url, e);
                    report.details_failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Run each query in its own session, at most `max_concurrent_sessions`
    /// at a time. Outcomes come back in query order, so reports that finished
    /// before a cancellation or a session failure are kept.
    pub async fn run_many<F, D>(
        &self,
        queries: &[QueryInput],
        factory: F,
        cancel: &CancellationToken,
    ) -> Vec<Result<PipelineReport, PipelineError>>
    where
        F: Fn() -> Result<D, FetchError>,
        D: PageDriver,
    {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_sessions.max(1)));

        let runs = queries.iter().map(|query| {
            let permits = Arc::clone(&permits);
            let factory = &factory;
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => permit.map_err(|_| PipelineError::Cancelled)?,
                    () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                };
                let mut driver = factory().map_err(|e| {
                    error!("Failed to create session for '{}': {}", query.search_text(), e);
                    PipelineError::Session(e)
                })?;
                self.run(query, &mut driver, cancel).await
            }
        });

        join_all(runs).await
    }
}
