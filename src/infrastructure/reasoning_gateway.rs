//! Rate-limited gateway to the external reasoning service
//!
//! One `ReasoningGateway` is constructed per process and shared by handle.
//! It enforces a single account-wide minimum interval between upstream calls
//! and caches outcomes per request key: successes for `success_ttl`, errors
//! for the shorter `error_ttl`. A rate-limit rejection is cached and answered
//! with the configured fallback content instead of being returned as an error.

#![allow(clippy::uninlined_format_args)]

pub mod openai;

pub use openai::OpenAiChatBackend;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::config::GatewayConfig;

/// Function the service may ask the caller to invoke
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    /// Raw JSON arguments as produced by the service
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            tools: None,
            temperature: None,
            max_tokens: None,
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Content hash of the request, usable as the cache key
    pub fn cache_key(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ReasoningResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("Reasoning call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Rate limited by upstream (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Reasoning protocol error: {0}")]
    Protocol(String),

    /// Caller gave up; never cached
    #[error("Reasoning call cancelled")]
    Cancelled,
}

impl ReasoningError {
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol(message.to_string())
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Transport to the external service
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Fresh,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReply {
    pub response: ReasoningResponse,
    pub source: ReplySource,
    /// Set when `response` is the fallback content standing in for an upstream error
    pub degraded: Option<ReasoningError>,
}

impl GatewayReply {
    pub const fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_calls: u64,
    pub degraded_replies: u64,
    pub cached_entries: usize,
}

#[derive(Debug, Clone)]
enum CachedOutcome {
    Success(ReasoningResponse),
    Degraded(ReasoningResponse, ReasoningError),
    Failure(ReasoningError),
}

impl CachedOutcome {
    const fn is_error(&self) -> bool {
        !matches!(self, Self::Success(_))
    }

    fn into_reply(self, source: ReplySource) -> Result<GatewayReply, ReasoningError> {
        match self {
            Self::Success(response) => Ok(GatewayReply {
                response,
                source,
                degraded: None,
            }),
            Self::Degraded(response, error) => Ok(GatewayReply {
                response,
                source,
                degraded: Some(error),
            }),
            Self::Failure(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    outcome: CachedOutcome,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    upstream: AtomicU64,
    degraded: AtomicU64,
}

pub struct ReasoningGateway {
    backend: Arc<dyn ReasoningBackend>,
    config: GatewayConfig,
    /// Time of the last upstream call; the lock is the throttle's critical section
    last_call: Mutex<Option<Instant>>,
    cache: StdMutex<HashMap<String, CacheEntry>>,
    counters: Counters,
}

impl std::fmt::Debug for ReasoningGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningGateway")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ReasoningGateway {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config,
            last_call: Mutex::new(None),
            cache: StdMutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn call(
        &self,
        request_key: &str,
        request: &ReasoningRequest,
    ) -> Result<GatewayReply, ReasoningError> {
        self.call_with_cancellation(request_key, request, &CancellationToken::new())
            .await
    }

    /// Call keyed by the request's content hash
    pub async fn call_request(&self, request: &ReasoningRequest) -> Result<GatewayReply, ReasoningError> {
        self.call(&request.cache_key(), request).await
    }

    /// Cancellation aborts a wait on the rate floor or the upstream call.
    /// A cancelled wait leaves the last-call timestamp untouched.
    pub async fn call_with_cancellation(
        &self,
        request_key: &str,
        request: &ReasoningRequest,
        cancel: &CancellationToken,
    ) -> Result<GatewayReply, ReasoningError> {
        if let Some(outcome) = self.lookup(request_key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Reasoning cache hit for {}", request_key);
            return outcome.into_reply(ReplySource::Cached);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        {
            let mut last_call = tokio::select! {
                guard = self.last_call.lock() => guard,
                () = cancel.cancelled() => return Err(ReasoningError::Cancelled),
            };

            if let Some(previous) = *last_call {
                let elapsed = previous.elapsed();
                let floor = self.config.min_interval();
                if elapsed < floor {
                    let wait = floor - elapsed;
                    info!("Reasoning rate floor: waiting {:?}", wait);
                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = cancel.cancelled() => return Err(ReasoningError::Cancelled),
                    }
                }
            }

            // Another caller may have answered this key while we waited
            if let Some(outcome) = self.lookup(request_key) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return outcome.into_reply(ReplySource::Cached);
            }

            *last_call = Some(Instant::now());
        }

        self.counters.upstream.fetch_add(1, Ordering::Relaxed);
        let timeout = self.config.call_timeout();
        let result = tokio::select! {
            result = tokio::time::timeout(timeout, self.backend.complete(request)) => {
                result.unwrap_or_else(|_| Err(ReasoningError::Timeout {
                    after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }))
            }
            () = cancel.cancelled() => return Err(ReasoningError::Cancelled),
        };

        let outcome = match result {
            Ok(response) => CachedOutcome::Success(response),
            Err(ReasoningError::Cancelled) => return Err(ReasoningError::Cancelled),
            Err(error) if error.is_rate_limited() => {
                warn!("Reasoning service rate limited the call, serving fallback content");
                self.counters.degraded.fetch_add(1, Ordering::Relaxed);
                CachedOutcome::Degraded(ReasoningResponse::text(&self.config.fallback_content), error)
            }
            Err(error) => {
                warn!("Reasoning call failed: {}", error);
                CachedOutcome::Failure(error)
            }
        };

        self.store(request_key, outcome.clone());
        outcome.into_reply(ReplySource::Fresh)
    }

    fn ttl_for(&self, outcome: &CachedOutcome) -> Duration {
        if outcome.is_error() {
            self.config.error_ttl()
        } else {
            self.config.success_ttl()
        }
    }

    fn lookup(&self, key: &str) -> Option<CachedOutcome> {
        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = cache.get(key)?;
        if entry.stored_at.elapsed() < self.ttl_for(&entry.outcome) {
            return Some(entry.outcome.clone());
        }
        cache.remove(key);
        None
    }

    fn store(&self, key: &str, outcome: CachedOutcome) {
        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if cache.len() >= self.config.max_cache_entries && !cache.contains_key(key) {
            cache.retain(|_, entry| entry.stored_at.elapsed() < self.ttl_for(&entry.outcome));
            if cache.len() >= self.config.max_cache_entries {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }
        cache.insert(
            key.to_string(),
            CacheEntry {
                outcome,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, entry| entry.stored_at.elapsed() < self.ttl_for(&entry.outcome));
        before - cache.len()
    }

    pub fn stats(&self) -> GatewayStats {
        let cached_entries = self
            .cache
            .lock()
            .map(|cache| cache.len())
            .unwrap_or_default();
        GatewayStats {
            cache_hits: self.counters.hits.load(Ordering::Relaxed),
            cache_misses: self.counters.misses.load(Ordering::Relaxed),
            upstream_calls: self.counters.upstream.load(Ordering::Relaxed),
            degraded_replies: self.counters.degraded.load(Ordering::Relaxed),
            cached_entries,
        }
    }
}
