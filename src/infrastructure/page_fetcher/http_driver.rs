//! Plain HTTP page driver
//!
//! Fetches the server-rendered document with `reqwest`. There is no script
//! execution, so scrolling is a no-op and readiness is decided once against
//! the fetched document, parsed a single time for the whole selector list.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use super::{FetchError, PageDriver};
use crate::infrastructure::config::FetcherConfig;

/// Request quota shared by every session hitting the same host
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

pub fn shared_rate_limiter(max_requests_per_second: u32) -> Result<SharedRateLimiter, FetchError> {
    let per_second = NonZeroU32::new(max_requests_per_second).ok_or_else(|| {
        FetchError::SessionUnavailable("Rate limit must be greater than 0".to_string())
    })?;
    Ok(Arc::new(RateLimiter::direct(Quota::per_second(per_second))))
}

/// Count elements matching `selector` in a document. An invalid selector counts as zero.
pub fn count_in_document(html: &str, selector: &str) -> usize {
    let Ok(selector) = Selector::parse(selector) else {
        warn!("Invalid readiness selector '{}'", selector);
        return 0;
    };
    Html::parse_document(html).select(&selector).count()
}

/// Position and match count of the first selector matching in `html`.
/// The document is parsed once; invalid selectors are skipped.
pub fn first_match_in_document(html: &str, selectors: &[String]) -> Option<(usize, usize)> {
    let document = Html::parse_document(html);
    selectors.iter().enumerate().find_map(|(index, raw)| {
        let Ok(selector) = Selector::parse(raw) else {
            warn!("Invalid readiness selector '{}'", raw);
            return None;
        };
        let count = document.select(&selector).count();
        (count > 0).then_some((index, count))
    })
}

pub struct HttpPageDriver {
    client: Client,
    rate_limiter: SharedRateLimiter,
    user_agent: HeaderValue,
    document: Option<String>,
    current_url: Option<String>,
}

impl std::fmt::Debug for HttpPageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPageDriver")
            .field("user_agent", &self.user_agent)
            .field("current_url", &self.current_url)
            .finish_non_exhaustive()
    }
}

impl HttpPageDriver {
    /// Create a session with its own cookie jar, throttled by `rate_limiter`
    pub fn new(config: &FetcherConfig, rate_limiter: SharedRateLimiter) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        let language = HeaderValue::from_str(&config.accept_language).map_err(|e| {
            FetchError::SessionUnavailable(format!("Invalid accept-language header: {e}"))
        })?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = Client::builder()
            .timeout(config.navigation_timeout())
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::SessionUnavailable(format!("Failed to create HTTP client: {e}")))?;

        let first_agent = config
            .user_agents
            .first()
            .map_or("market-scout", String::as_str);
        let user_agent = HeaderValue::from_str(first_agent)
            .map_err(|e| FetchError::SessionUnavailable(format!("Invalid user agent: {e}")))?;

        Ok(Self {
            client,
            rate_limiter,
            user_agent,
            document: None,
            current_url: None,
        })
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }
}

#[async_trait]
impl PageDriver for HttpPageDriver {
    fn is_static(&self) -> bool {
        true
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), FetchError> {
        self.user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| FetchError::SessionUnavailable(format!("Invalid user agent: {e}")))?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.document = None;
        self.rate_limiter.until_ready().await;

        info!("Fetching URL: {}", url);
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .send()
            .await
            .map_err(|e| FetchError::navigation(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::navigation(url, format!("failed to read body: {e}")))?;
        debug!("Fetched {} ({} bytes)", url, body.len());

        self.current_url = Some(url.to_string());
        self.document = Some(body);
        Ok(())
    }

    async fn count_matches(&mut self, selector: &str) -> Result<usize, FetchError> {
        Ok(self
            .document
            .as_deref()
            .map_or(0, |html| count_in_document(html, selector)))
    }

    async fn first_match(&mut self, selectors: &[String]) -> Result<Option<(usize, usize)>, FetchError> {
        Ok(self
            .document
            .as_deref()
            .and_then(|html| first_match_in_document(html, selectors)))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.document.clone().ok_or_else(|| {
            FetchError::navigation(self.current_url.as_deref().unwrap_or("-"), "no document loaded")
        })
    }
}
