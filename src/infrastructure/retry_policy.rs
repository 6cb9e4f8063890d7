//! Retry policy for page navigation
//!
//! Classifies fetch failures and spaces further attempts with exponential
//! backoff. Client errors, cancellation and unusable sessions are never
//! retried.

use std::time::Duration;

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::page_fetcher::FetchError;

/// How a failed navigation should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection trouble, timeouts, 5xx answers
    Transient,
    /// HTTP 429; retried with a doubled delay
    RateLimited,
    Permanent,
}

impl FailureClass {
    pub fn of(error: &FetchError) -> Self {
        match error {
            FetchError::HttpStatus { status: 429, .. } => Self::RateLimited,
            FetchError::HttpStatus { status, .. } if *status >= 500 => Self::Transient,
            FetchError::Navigation { .. } => Self::Transient,
            FetchError::HttpStatus { .. }
            | FetchError::PageLoadTimeout { .. }
            | FetchError::Cancelled
            | FetchError::SessionUnavailable(_) => Self::Permanent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based):
    /// `base * factor^(attempt - 1)`, capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = u64::from(self.config.backoff_factor).saturating_pow(attempt.saturating_sub(1));
        let delay_ms = self
            .config
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay before the next attempt, or `None` when `error` after attempt
    /// number `attempt` should be returned to the caller.
    pub fn next_delay(&self, error: &FetchError, attempt: u32) -> Option<Duration> {
        if attempt >= self.config.max_attempts {
            return None;
        }
        match FailureClass::of(error) {
            FailureClass::Permanent => None,
            FailureClass::Transient => Some(self.backoff(attempt)),
            FailureClass::RateLimited => Some(
                self.backoff(attempt)
                    .saturating_mul(2)
                    .min(Duration::from_millis(self.config.max_delay_ms)),
            ),
        }
    }
}
