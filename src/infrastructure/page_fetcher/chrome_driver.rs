//! Headless Chromium page driver (`chrome` feature)
//!
//! The `headless_chrome` API is blocking, so every tab operation runs on the
//! blocking pool. One driver owns one browser and one tab.

use std::ffi::OsStr;
use std::sync::Arc;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use super::{FetchError, PageDriver};
use crate::infrastructure::config::FetcherConfig;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, document.body.scrollHeight)";

pub struct ChromePageDriver {
    _browser: Browser,
    tab: Arc<Tab>,
    accept_language: String,
}

impl std::fmt::Debug for ChromePageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromePageDriver")
            .field("accept_language", &self.accept_language)
            .finish_non_exhaustive()
    }
}

impl ChromePageDriver {
    /// Launch a browser session. Failure here is fatal for the caller.
    pub fn launch(config: &FetcherConfig) -> Result<Self, FetchError> {
        let args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--mute-audio"),
            OsStr::new("--window-size=1920,1080"),
            OsStr::new("--lang=ja-JP"),
        ];

        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .idle_browser_timeout(config.navigation_timeout() * 4)
            .args(args)
            .build()
            .map_err(|e| FetchError::SessionUnavailable(format!("Invalid launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| FetchError::SessionUnavailable(format!("Failed to launch browser: {e}")))?;
        let tab = browser
            .new_tab()
            .map_err(|e| FetchError::SessionUnavailable(format!("Failed to open tab: {e}")))?;
        tab.set_default_timeout(config.navigation_timeout());

        info!("Launched headless browser session");
        Ok(Self {
            _browser: browser,
            tab,
            accept_language: config.accept_language.clone(),
        })
    }

    /// Run a blocking tab operation off the async runtime
    async fn with_tab<T, F>(&self, op: &'static str, f: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| FetchError::SessionUnavailable(format!("{op} task failed: {e}")))?
            .map_err(|e| FetchError::Navigation {
                url: op.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<(), FetchError> {
        let user_agent = user_agent.to_string();
        let language = self.accept_language.clone();
        self.with_tab("set_user_agent", move |tab| {
            tab.set_user_agent(&user_agent, Some(&language), None)?;
            Ok(())
        })
        .await
    }

    async fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        let target = url.to_string();
        self.with_tab("navigate", move |tab| {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            FetchError::Navigation { reason, .. } => FetchError::navigation(url, reason),
            other => other,
        })
    }

    async fn count_matches(&mut self, selector: &str) -> Result<usize, FetchError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| FetchError::navigation("count_matches", e))?;
        let script = format!("document.querySelectorAll({quoted}).length");
        let count = self
            .with_tab("count_matches", move |tab| {
                let result = tab.evaluate(&script, false)?;
                Ok(result
                    .value
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default())
            })
            .await?;
        debug!("Selector {} matched {} elements", selector, count);
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), FetchError> {
        self.with_tab("scroll", |tab| {
            tab.evaluate(SCROLL_SCRIPT, false)?;
            Ok(())
        })
        .await
    }

    async fn content(&mut self) -> Result<String, FetchError> {
        self.with_tab("content", |tab| tab.get_content()).await
    }
}
