//! Scheduled scrape job
//!
//! Runs the pipeline over a fixed keyword list and appends the ranked,
//! tagged records to a JSON-lines file.
//!
//! ```bash
//! scheduled_scrape [config.toml] [output.jsonl]
//! ```
//!
//! Without a config file the JSON config under the user config directory is
//! used (created with defaults on first run).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use market_scout::application::{PipelineError, PipelineReport, ScrapePipeline};
use market_scout::domain::QueryInput;
use market_scout::infrastructure::logging::{init_logging_with_config, log_system_info};
use market_scout::infrastructure::{ConfigManager, JsonLinesSink, ScoutConfig};

const KEYWORDS: &[&str] = &[
    "iPhone",
    "Nintendo Switch",
    "MacBook",
    "PlayStation",
    "AirPods",
    "Louis Vuitton",
    "Rolex",
    "Supreme",
    "Chanel",
];

const DEFAULT_OUTPUT: &str = "market-scout-results.jsonl";

async fn load_config(path: Option<PathBuf>) -> Result<ScoutConfig> {
    match path {
        Some(path) => ScoutConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let config = ConfigManager::new()?.load_config().await?;
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = load_config(args.next().map(PathBuf::from)).await?;
    let output = args.next().map_or_else(|| PathBuf::from(DEFAULT_OUTPUT), PathBuf::from);

    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    let sink = Arc::new(JsonLinesSink::new(&output));
    let pipeline = ScrapePipeline::from_config(&config)?.with_sink(sink);
    let queries: Vec<QueryInput> = KEYWORDS.iter().map(|k| QueryInput::new([*k])).collect();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scrape");
            trigger.cancel();
        }
    });

    info!("Starting scheduled scrape of {} queries into {}", queries.len(), output.display());
    let outcomes = run_queries(&pipeline, &config, &queries, &cancel).await?;

    let mut reports = Vec::new();
    let mut session_failure = None;
    for (query, outcome) in queries.iter().zip(outcomes) {
        match outcome {
            Ok(report) => reports.push(report),
            Err(PipelineError::Cancelled) => warn!("Query '{}' cancelled", query.search_text()),
            Err(e) => {
                error!("Query '{}' failed: {}", query.search_text(), e);
                if session_failure.is_none() {
                    session_failure = Some(e);
                }
            }
        }
    }

    for report in reports.iter().filter(|r| r.is_no_matches()) {
        info!("No products found for query: {}", report.query);
    }

    let all_records: Vec<_> = reports.iter().flat_map(|r| r.records.iter().cloned()).collect();
    let summary = serde_json::json!({
        "queries": reports.iter().map(query_summary).collect::<Vec<_>>(),
        "tags": pipeline.tagging().summarize(&all_records),
        "output": output.display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(e) = session_failure {
        error!("Scheduled scrape finished with session failures");
        return Err(e.into());
    }
    info!("Scheduled scrape complete");
    Ok(())
}

#[cfg(not(feature = "chrome"))]
async fn run_queries(
    pipeline: &ScrapePipeline,
    config: &ScoutConfig,
    queries: &[QueryInput],
    cancel: &CancellationToken,
) -> Result<Vec<Result<PipelineReport, PipelineError>>> {
    use market_scout::infrastructure::page_fetcher::{HttpPageDriver, shared_rate_limiter};

    let limiter = shared_rate_limiter(config.fetcher.max_requests_per_second)?;
    Ok(pipeline
        .run_many(
            queries,
            || HttpPageDriver::new(&config.fetcher, Arc::clone(&limiter)),
            cancel,
        )
        .await)
}

#[cfg(feature = "chrome")]
async fn run_queries(
    pipeline: &ScrapePipeline,
    config: &ScoutConfig,
    queries: &[QueryInput],
    cancel: &CancellationToken,
) -> Result<Vec<Result<PipelineReport, PipelineError>>> {
    use market_scout::infrastructure::page_fetcher::ChromePageDriver;

    Ok(pipeline
        .run_many(queries, || ChromePageDriver::launch(&config.fetcher), cancel)
        .await)
}

fn query_summary(report: &PipelineReport) -> serde_json::Value {
    serde_json::json!({
        "query": report.query,
        "records": report.records.len(),
        "pages_fetched": report.pages_fetched,
        "pages_empty": report.pages_empty,
        "malformed": report.malformed,
        "node_failures": report.node_failures,
        "duplicates_removed": report.duplicates_removed,
        "details_fetched": report.details_fetched,
        "details_failed": report.details_failed,
        "stored": report.stored,
        "sink_error": report.sink_error,
        "top": report.records.first().map(|r| r.title.clone()),
    })
}
