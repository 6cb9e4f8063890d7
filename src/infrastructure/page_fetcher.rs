//! Page fetcher
//!
//! Loads one search results page through a `PageDriver` session: build the
//! search URL, navigate with a bounded timeout (retried with backoff on
//! transient failures), poll the container selectors until one matches, then
//! run a few scroll-and-wait cycles so lazily loaded items render. Item pages
//! go through the same navigate-and-wait steps without scrolling. Every wait
//! honours a `CancellationToken`.

#![allow(clippy::uninlined_format_args)]

#[cfg(feature = "chrome")]
pub mod chrome_driver;
pub mod http_driver;
pub mod search_url;

#[cfg(feature = "chrome")]
pub use chrome_driver::ChromePageDriver;
pub use http_driver::{HttpPageDriver, SharedRateLimiter, shared_rate_limiter};
pub use search_url::SearchUrlBuilder;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::query::FilterSet;
use crate::infrastructure::config::{ExtractionConfig, FetcherConfig};
use crate::infrastructure::parsing::product_list_parser::{FALLBACK_PRICE_LABEL, count_price_text_parents};
use crate::infrastructure::retry_policy::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("No readiness check matched within {waited_ms}ms: {url}")]
    PageLoadTimeout { url: String, waited_ms: u64 },

    #[error("Navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation failed for {url}: HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),
}

impl FetchError {
    pub fn navigation(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Only a session that cannot be used at all stops the batch
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionUnavailable(_))
    }
}

/// One browser tab or HTTP session. Not shared between tasks.
#[async_trait]
pub trait PageDriver: Send {
    /// Static drivers serve a fixed document per navigation, so readiness is
    /// checked once and scrolling is skipped.
    fn is_static(&self) -> bool {
        false
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), FetchError>;

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError>;

    async fn count_matches(&mut self, selector: &str) -> Result<usize, FetchError>;

    /// Position and match count of the first selector that matches anything.
    async fn first_match(&mut self, selectors: &[String]) -> Result<Option<(usize, usize)>, FetchError> {
        for (index, selector) in selectors.iter().enumerate() {
            match self.count_matches(selector).await {
                Ok(0) => {}
                Ok(count) => return Ok(Some((index, count))),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Readiness check {} failed: {}", selector, e),
            }
        }
        Ok(None)
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError>;

    async fn content(&mut self) -> Result<String, FetchError>;
}

/// A loaded results or item page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    /// Readiness check that matched
    pub matched_selector: String,
    /// 0 for item pages
    pub page_number: u32,
    /// Navigation attempts it took
    pub attempts: u32,
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = cancel.cancelled() => Err(FetchError::Cancelled),
    }
}

/// Random duration in the inclusive millisecond window
pub fn jittered(min_ms: u64, max_ms: u64) -> Duration {
    if min_ms >= max_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(fastrand::u64(min_ms..=max_ms))
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    config: FetcherConfig,
    url_builder: SearchUrlBuilder,
    retry: RetryPolicy,
    /// Container selectors followed by the item link fallback
    results_checks: Vec<String>,
    detail_checks: Vec<String>,
}

impl PageFetcher {
    pub fn new(config: FetcherConfig, extraction: &ExtractionConfig) -> Result<Self, FetchError> {
        let url_builder = SearchUrlBuilder::new(&config.search_url)?;
        let mut results_checks = extraction.container_selectors.clone();
        results_checks.push(extraction.fallback_link_selector.clone());
        Ok(Self {
            retry: RetryPolicy::new(config.retry.clone()),
            config,
            url_builder,
            results_checks,
            detail_checks: extraction.detail_container_selectors.clone(),
        })
    }

    /// Selectors polled to decide that a results page has loaded
    pub fn results_checks(&self) -> &[String] {
        &self.results_checks
    }

    pub const fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub const fn url_builder(&self) -> &SearchUrlBuilder {
        &self.url_builder
    }

    /// Pick a client identity for a new session
    pub fn random_user_agent(&self) -> Option<&str> {
        if self.config.user_agents.is_empty() {
            return None;
        }
        let index = fastrand::usize(..self.config.user_agents.len());
        Some(self.config.user_agents[index].as_str())
    }

    /// Prepare a fresh session with a random client identity
    pub async fn start_session(&self, driver: &mut dyn PageDriver) -> Result<(), FetchError> {
        if let Some(user_agent) = self.random_user_agent() {
            debug!("Session user agent: {}", user_agent);
            driver.set_user_agent(user_agent).await?;
        }
        Ok(())
    }

    /// Load one results page.
    ///
    /// `PageLoadTimeout`, `Navigation` and `HttpStatus` mean "no items on this
    /// page" to the caller; only `SessionUnavailable` is fatal.
    pub async fn fetch(
        &self,
        driver: &mut dyn PageDriver,
        keyword: &str,
        filters: &FilterSet,
        page_number: u32,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let url = self.url_builder.build(keyword, filters, page_number).to_string();
        info!("Loading page {} for '{}': {}", page_number, keyword, url);

        let attempts = self.navigate_with_retry(driver, &url, cancel).await?;
        let matched_selector = self
            .wait_until_ready(driver, &url, &self.results_checks, true, cancel)
            .await?;

        if !driver.is_static() {
            for cycle in 1..=self.config.scroll_cycles {
                driver.scroll_to_bottom().await?;
                let pause = jittered(self.config.scroll_delay_min_ms, self.config.scroll_delay_max_ms);
                debug!("Scroll cycle {} of {}, waiting {:?}", cycle, self.config.scroll_cycles, pause);
                cancellable_sleep(pause, cancel).await?;
            }
        }

        let html = driver.content().await?;
        Ok(FetchedPage {
            url,
            html,
            matched_selector,
            page_number,
            attempts,
        })
    }

    /// Load one item page. Failures mean the same as for `fetch`.
    pub async fn fetch_detail(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        info!("Loading item page: {}", url);
        let attempts = self.navigate_with_retry(driver, url, cancel).await?;
        let matched_selector = self
            .wait_until_ready(driver, url, &self.detail_checks, false, cancel)
            .await?;
        let html = driver.content().await?;
        Ok(FetchedPage {
            url: url.to_string(),
            html,
            matched_selector,
            page_number: 0,
            attempts,
        })
    }

    /// Navigate, retrying transient failures with backoff. Returns the
    /// number of attempts used.
    async fn navigate_with_retry(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<u32, FetchError> {
        let mut attempt = 1;
        loop {
            let error = match self.navigate_once(driver, url, cancel).await {
                Ok(()) => return Ok(attempt),
                Err(e) => e,
            };
            let Some(delay) = self.retry.next_delay(&error, attempt) else {
                if attempt > 1 {
                    error!("All {} attempts failed for {}: {}", attempt, url, error);
                }
                return Err(error);
            };
            warn!("Attempt {} failed for {}: {}; retrying in {:?}", attempt, url, error, delay);
            cancellable_sleep(delay, cancel).await?;
            attempt += 1;
        }
    }

    async fn navigate_once(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), FetchError> {
        let navigation = tokio::time::timeout(self.config.navigation_timeout(), driver.navigate(url));
        tokio::select! {
            result = navigation => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("Navigation timed out after {:?}: {}", self.config.navigation_timeout(), url);
                    Err(FetchError::navigation(url, "navigation timed out"))
                }
            },
            () = cancel.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Poll `checks` in order until one matches or the load budget runs out.
    /// With `price_text` set, a document whose only recognisable content is
    /// bare yen amounts also counts as loaded.
    async fn wait_until_ready(
        &self,
        driver: &mut dyn PageDriver,
        url: &str,
        checks: &[String],
        price_text: bool,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let started = Instant::now();
        let deadline = started + self.config.load_timeout();

        loop {
            if let Some((index, count)) = driver.first_match(checks).await? {
                info!("Page ready: {} elements match {}", count, checks[index]);
                return Ok(checks[index].clone());
            }
            if price_text {
                match driver.content().await {
                    Ok(html) => {
                        let count = count_price_text_parents(&html);
                        if count > 0 {
                            info!("Page ready: {} price texts outside known containers", count);
                            return Ok(FALLBACK_PRICE_LABEL.to_string());
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => debug!("Price text check failed: {}", e),
                }
            }

            let now = Instant::now();
            if driver.is_static() || now >= deadline {
                break;
            }
            let pause = self.config.load_poll_interval().min(deadline - now);
            cancellable_sleep(pause, cancel).await?;
        }

        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        warn!("No readiness check matched after {}ms: {}", waited_ms, url);
        Err(FetchError::PageLoadTimeout {
            url: url.to_string(),
            waited_ms,
        })
    }
}
