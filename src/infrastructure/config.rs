//! Configuration infrastructure
//!
//! `ScoutConfig` groups every tunable of the pipeline. It can be loaded two
//! ways: through `ConfigManager` (JSON file in the user config directory,
//! created on first run) or through `ScoutConfig::from_file`, which layers a
//! file and `MARKET_SCOUT_*` environment variables with the `config` crate.

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

pub use crate::infrastructure::parsing::config::ExtractionConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from file: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScoutConfig {
    pub fetcher: FetcherConfig,
    pub extraction: ExtractionConfig,
    pub gateway: GatewayConfig,
    pub ranking: RankingConfig,
    pub tagging: TaggingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Page fetcher settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Search endpoint of the marketplace
    pub search_url: String,

    /// Client identities, one picked at random per session
    pub user_agents: Vec<String>,

    pub accept_language: String,

    /// Upper bound for a single navigation
    pub navigation_timeout_secs: u64,

    /// Budget for a container selector to appear after navigation
    pub load_timeout_ms: u64,

    /// Interval between readiness polls
    pub load_poll_interval_ms: u64,

    /// Scroll-and-wait cycles after the page is ready
    pub scroll_cycles: u32,

    pub scroll_delay_min_ms: u64,
    pub scroll_delay_max_ms: u64,

    /// Requests per second allowed by the HTTP driver
    pub max_requests_per_second: u32,

    /// Run the browser driver without a window
    pub headless: bool,

    /// Backoff between navigation attempts
    pub retry: RetryConfig,
}

impl FetcherConfig {
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub const fn load_poll_interval(&self) -> Duration {
        Duration::from_millis(self.load_poll_interval_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            search_url: marketplace::SEARCH_URL.to_string(),
            user_agents: defaults::USER_AGENTS.iter().map(|s| (*s).to_string()).collect(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            navigation_timeout_secs: defaults::NAVIGATION_TIMEOUT_SECS,
            load_timeout_ms: defaults::LOAD_TIMEOUT_MS,
            load_poll_interval_ms: defaults::LOAD_POLL_INTERVAL_MS,
            scroll_cycles: defaults::SCROLL_CYCLES,
            scroll_delay_min_ms: defaults::SCROLL_DELAY_MIN_MS,
            scroll_delay_max_ms: defaults::SCROLL_DELAY_MAX_MS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            headless: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for failed navigations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per navigation, the first one included
    pub max_attempts: u32,

    /// Delay after the first failure
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each further failure
    pub backoff_factor: u32,

    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            backoff_factor: defaults::RETRY_BACKOFF_FACTOR,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
        }
    }
}

/// Rate-limited reasoning gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Minimum spacing between two upstream calls, account-wide
    pub min_interval_secs: u64,

    pub success_ttl_secs: u64,
    pub error_ttl_secs: u64,

    /// Upper bound for one upstream call
    pub call_timeout_secs: u64,

    /// Content returned when upstream rejects a call for rate limiting
    pub fallback_content: String,

    pub max_cache_entries: usize,

    pub endpoint: String,
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    pub temperature: f32,
    pub max_tokens: u32,
}

impl GatewayConfig {
    pub const fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub const fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_secs)
    }

    pub const fn error_ttl(&self) -> Duration {
        Duration::from_secs(self.error_ttl_secs)
    }

    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: defaults::GATEWAY_MIN_INTERVAL_SECS,
            success_ttl_secs: defaults::GATEWAY_SUCCESS_TTL_SECS,
            error_ttl_secs: defaults::GATEWAY_ERROR_TTL_SECS,
            call_timeout_secs: defaults::GATEWAY_CALL_TIMEOUT_SECS,
            fallback_content: defaults::GATEWAY_FALLBACK_CONTENT.to_string(),
            max_cache_entries: defaults::GATEWAY_MAX_CACHE_ENTRIES,
            endpoint: defaults::REASONING_ENDPOINT.to_string(),
            model: defaults::REASONING_MODEL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Composite score weights. They must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub relevance: f64,
    pub price: f64,
    pub condition: f64,
    pub seller_rating: f64,
}

impl ScoreWeights {
    pub const TOLERANCE: f64 = 1e-6;

    pub fn sum(&self) -> f64 {
        self.relevance + self.price + self.condition + self.seller_rating
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in [
            ("relevance", self.relevance),
            ("price", self.price),
            ("condition", self.condition),
            ("seller_rating", self.seller_rating),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::validation(format!(
                    "ranking weight {} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }
        if (self.sum() - 1.0).abs() > Self::TOLERANCE {
            return Err(ConfigError::validation(format!(
                "ranking weights must sum to 1.0, got {}",
                self.sum()
            )));
        }
        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance: 0.30,
            price: 0.25,
            condition: 0.25,
            seller_rating: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: ScoreWeights,

    /// Word-overlap ratio above which two titles are duplicates
    pub duplicate_threshold: f64,

    /// Seller-rating sub-score used when a listing shows no rating
    pub missing_rating_score: f64,

    pub brand_bonus: f64,
    pub category_bonus: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            duplicate_threshold: defaults::DUPLICATE_THRESHOLD,
            missing_rating_score: defaults::MISSING_RATING_SCORE,
            brand_bonus: 0.30,
            category_bonus: 0.20,
        }
    }
}

/// Fixed yen thresholds for price-tier tags (inclusive upper bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTiers {
    pub very_affordable: u64,
    pub affordable: u64,
    pub mid_range: u64,
    pub premium: u64,
}

impl Default for PriceTiers {
    fn default() -> Self {
        Self {
            very_affordable: 2_000,
            affordable: 5_000,
            mid_range: 15_000,
            premium: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub max_tags: usize,
    pub min_tag_len: usize,
    pub price_tiers: PriceTiers,

    /// Relative-value ratios against the average price of the other records
    pub great_deal_ratio: f64,
    pub good_deal_ratio: f64,
    pub premium_price_ratio: f64,

    /// Generic filler phrases; any tag containing one is dropped
    pub denylist: Vec<String>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            max_tags: defaults::MAX_TAGS,
            min_tag_len: 2,
            price_tiers: PriceTiers::default(),
            great_deal_ratio: 0.7,
            good_deal_ratio: 0.9,
            premium_price_ratio: 1.3,
            denylist: defaults::TAG_DENYLIST.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pages_per_query: u32,

    /// Records kept after ranking; 0 keeps everything
    pub max_results: usize,

    /// Independent browser sessions run at once by `run_many`
    pub max_concurrent_sessions: usize,

    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,

    /// Hand results to the sink when one is attached
    pub store_results: bool,

    /// Top ranked listings per query completed from their item page; 0 skips
    /// item pages entirely
    pub detail_pages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pages_per_query: defaults::PAGES_PER_QUERY,
            max_results: defaults::MAX_RESULTS,
            max_concurrent_sessions: defaults::MAX_CONCURRENT_SESSIONS,
            page_delay_min_ms: defaults::PAGE_DELAY_MIN_MS,
            page_delay_max_ms: defaults::PAGE_DELAY_MAX_MS,
            store_results: true,
            detail_pages: defaults::DETAIL_PAGES,
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Keep only the most recent log file (delete all others)
    pub keep_only_latest: bool,

    /// Module-specific level overrides (e.g. "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: true,
            keep_only_latest: false,
            module_filters: HashMap::new(),
        }
    }
}

impl ScoutConfig {
    /// Load from a file (format inferred from its extension), overlaid with
    /// `MARKET_SCOUT_<SECTION>__<KEY>` environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("MARKET_SCOUT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranking.weights.validate()?;
        if !(0.0..=1.0).contains(&self.ranking.duplicate_threshold) {
            return Err(ConfigError::validation("duplicate_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.ranking.missing_rating_score) {
            return Err(ConfigError::validation("missing_rating_score must be within [0, 1]"));
        }

        let gateway = &self.gateway;
        if gateway.call_timeout_secs == 0 {
            return Err(ConfigError::validation("gateway call_timeout_secs must be greater than 0"));
        }
        if gateway.error_ttl_secs > gateway.success_ttl_secs {
            return Err(ConfigError::validation(
                "gateway error_ttl_secs cannot be greater than success_ttl_secs",
            ));
        }

        let fetcher = &self.fetcher;
        if fetcher.navigation_timeout_secs == 0 || fetcher.load_timeout_ms == 0 {
            return Err(ConfigError::validation("fetcher timeouts must be greater than 0"));
        }
        if fetcher.load_poll_interval_ms == 0 {
            return Err(ConfigError::validation("load_poll_interval_ms must be greater than 0"));
        }
        if fetcher.scroll_delay_min_ms > fetcher.scroll_delay_max_ms {
            return Err(ConfigError::validation(
                "scroll_delay_min_ms cannot be greater than scroll_delay_max_ms",
            ));
        }
        if fetcher.user_agents.is_empty() {
            return Err(ConfigError::validation("at least one user agent is required"));
        }
        if fetcher.max_requests_per_second == 0 {
            return Err(ConfigError::validation("max_requests_per_second must be greater than 0"));
        }
        if fetcher.retry.max_attempts == 0 || fetcher.retry.backoff_factor == 0 {
            return Err(ConfigError::validation(
                "retry max_attempts and backoff_factor must be greater than 0",
            ));
        }
        if fetcher.retry.base_delay_ms > fetcher.retry.max_delay_ms {
            return Err(ConfigError::validation(
                "retry base_delay_ms cannot be greater than max_delay_ms",
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.page_delay_min_ms > pipeline.page_delay_max_ms {
            return Err(ConfigError::validation(
                "page_delay_min_ms cannot be greater than page_delay_max_ms",
            ));
        }
        if pipeline.pages_per_query == 0 || pipeline.max_concurrent_sessions == 0 {
            return Err(ConfigError::validation(
                "pages_per_query and max_concurrent_sessions must be greater than 0",
            ));
        }

        let extraction = &self.extraction;
        if extraction.container_selectors.is_empty() {
            return Err(ConfigError::validation("container_selectors cannot be empty"));
        }
        if extraction.detail_container_selectors.is_empty() {
            return Err(ConfigError::validation("detail_container_selectors cannot be empty"));
        }
        for field in crate::infrastructure::parsing::FieldKind::ALL {
            if extraction.selectors.chain(field).is_empty() {
                return Err(ConfigError::validation(format!(
                    "selector chain for {} cannot be empty",
                    field
                )));
            }
        }
        if extraction.max_items_per_page == 0 {
            return Err(ConfigError::validation("max_items_per_page must be greater than 0"));
        }

        if self.tagging.max_tags == 0 {
            return Err(ConfigError::validation("max_tags must be greater than 0"));
        }
        Ok(())
    }
}

/// Configuration manager for the JSON config file in the user config directory
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("market-scout");

        Ok(config_dir)
    }

    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join("market_scout_config.json")))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating the default if it doesn't exist.
    /// A file that cannot be parsed or fails validation is backed up and reset.
    pub async fn load_config(&self) -> Result<ScoutConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = ScoutConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let parsed = serde_json::from_str::<ScoutConfig>(&content)
            .map_err(|e| e.to_string())
            .and_then(|config| config.validate().map(|()| config).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(reason) => {
                warn!("Configuration file unusable: {}", reason);
                warn!("Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                self.reset_to_defaults().await
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &ScoutConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Apply a change to the stored configuration and persist it
    pub async fn update_config<F>(&self, updater: F) -> Result<ScoutConfig>
    where
        F: FnOnce(&mut ScoutConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config);
        config.validate()?;
        self.save_config(&config).await?;
        Ok(config)
    }

    pub async fn reset_to_defaults(&self) -> Result<ScoutConfig> {
        let default_config = ScoutConfig::default();
        self.save_config(&default_config)
            .await
            .context("Failed to save default configuration")?;
        info!("Configuration reset to defaults");
        Ok(default_config)
    }

    pub const fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Marketplace URLs and image CDN constants
pub mod marketplace {
    pub const BASE_URL: &str = "https://jp.mercari.com";

    pub const SEARCH_URL: &str = "https://jp.mercari.com/search";

    /// Hosts whose images are accepted as listing thumbnails
    pub const IMAGE_HOSTS: &[&str] = &["static.mercdn.net", "mercdn.net", "mercari.com"];

    pub const PLACEHOLDER_IMAGE_URL: &str =
        "https://images.unsplash.com/photo-1517336714731-489689fd1ca8?w=300&h=300&fit=crop&crop=center";

    /// Fixed search parameters: newest first, only items still for sale
    pub const SORT: &str = "created_time";
    pub const ORDER: &str = "desc";
    pub const STATUS: &str = "on_sale";
}

/// Default configuration values
pub mod defaults {
    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    ];

    pub const ACCEPT_LANGUAGE: &str = "ja,en-US;q=0.9,en;q=0.8";

    pub const NAVIGATION_TIMEOUT_SECS: u64 = 15;
    pub const LOAD_TIMEOUT_MS: u64 = 15_000;
    pub const LOAD_POLL_INTERVAL_MS: u64 = 500;
    pub const SCROLL_CYCLES: u32 = 3;
    pub const SCROLL_DELAY_MIN_MS: u64 = 800;
    pub const SCROLL_DELAY_MAX_MS: u64 = 2_000;
    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;

    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_BACKOFF_FACTOR: u32 = 2;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    /// Original scraper examined at most 15 nodes per page
    pub const MAX_ITEMS_PER_PAGE: usize = 15;
    pub const MAX_NODE_TEXT_LEN: usize = 4_000;

    pub const GATEWAY_MIN_INTERVAL_SECS: u64 = 20;
    pub const GATEWAY_SUCCESS_TTL_SECS: u64 = 60;
    pub const GATEWAY_ERROR_TTL_SECS: u64 = 15;
    pub const GATEWAY_CALL_TIMEOUT_SECS: u64 = 30;
    pub const GATEWAY_MAX_CACHE_ENTRIES: usize = 256;
    pub const GATEWAY_FALLBACK_CONTENT: &str =
        "Here are the top products I found for you. Please check the details below.";
    pub const REASONING_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const REASONING_MODEL: &str = "gpt-4o";

    pub const DUPLICATE_THRESHOLD: f64 = 0.70;
    pub const MISSING_RATING_SCORE: f64 = 0.5;

    pub const MAX_TAGS: usize = 10;
    pub const TAG_DENYLIST: &[&str] = &[
        "brand affordable",
        "affordable brand",
        "cheap brand",
        "budget brand",
        "value brand",
        "economic brand",
        "inexpensive brand",
        "low cost brand",
        "discount brand",
        "budget friendly brand",
    ];

    pub const PAGES_PER_QUERY: u32 = 1;
    pub const MAX_RESULTS: usize = 20;
    pub const MAX_CONCURRENT_SESSIONS: usize = 2;
    pub const PAGE_DELAY_MIN_MS: u64 = 1_500;
    pub const PAGE_DELAY_MAX_MS: u64 = 3_000;
    pub const DETAIL_PAGES: usize = 0;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "market-scout.log";
    pub const LOG_MAX_FILES: u32 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        ScoutConfig::default().validate().unwrap();
        let weights = ScoreWeights::default();
        assert!((weights.sum() - 1.0).abs() < ScoreWeights::TOLERANCE);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let weights = ScoreWeights {
            relevance: 0.5,
            ..ScoreWeights::default()
        };
        assert!(matches!(weights.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_error_ttl_cannot_exceed_success_ttl() {
        let mut config = ScoutConfig::default();
        config.gateway.error_ttl_secs = config.gateway.success_ttl_secs + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scroll_window_must_be_ordered() {
        let mut config = ScoutConfig::default();
        config.fetcher.scroll_delay_min_ms = 5_000;
        config.fetcher.scroll_delay_max_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_are_validated() {
        let mut config = ScoutConfig::default();
        config.fetcher.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ScoutConfig::default();
        config.fetcher.retry.base_delay_ms = config.fetcher.retry.max_delay_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_selector_chain_is_rejected() {
        let mut config = ScoutConfig::default();
        config.extraction.selectors.price.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_from_file_layers_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scout.json");
        std::fs::write(
            &path,
            r#"{
                "gateway": {"min_interval_secs": 5},
                "pipeline": {"pages_per_query": 3},
                "extraction": {"selectors": {"price": [{"strategy": "css_text", "selector": ".cost"}]}}
            }"#,
        )
        .unwrap();

        let config = ScoutConfig::from_file(&path).unwrap();
        assert_eq!(config.gateway.min_interval_secs, 5);
        assert_eq!(config.gateway.success_ttl_secs, defaults::GATEWAY_SUCCESS_TTL_SECS);
        assert_eq!(config.pipeline.pages_per_query, 3);
        assert_eq!(config.extraction.selectors.price.len(), 1);
        assert!(!config.extraction.selectors.title.is_empty());
    }

    #[test]
    fn test_from_file_rejects_invalid_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scout.json");
        std::fs::write(&path, r#"{"ranking": {"weights": {"relevance": 0.9}}}"#).unwrap();
        assert!(matches!(
            ScoutConfig::from_file(&path),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_config_manager_creates_default_on_first_run() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert_eq!(config, ScoutConfig::default());
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn test_config_manager_resets_corrupted_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let manager = ConfigManager::with_path(&path);

        let config = manager.load_config().await.unwrap();
        assert_eq!(config, ScoutConfig::default());
        assert!(path.with_extension("json.corrupted").exists());
    }

    #[tokio::test]
    async fn test_config_manager_update_persists() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        manager
            .update_config(|c| c.pipeline.max_results = 7)
            .await
            .unwrap();
        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.pipeline.max_results, 7);
    }
}
