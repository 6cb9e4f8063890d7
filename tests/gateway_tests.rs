//! Reasoning gateway throttle and cache behaviour under a paused clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use market_scout::infrastructure::config::GatewayConfig;
use market_scout::infrastructure::reasoning_gateway::{
    GatewayReply, ReasoningBackend, ReasoningError, ReasoningGateway, ReasoningRequest,
    ReasoningResponse, ReplySource,
};

/// Backend that replays scripted outcomes, then echoes the prompt.
#[derive(Default)]
struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ReasoningResponse, ReasoningError>>>,
    calls: Mutex<Vec<Instant>>,
    hang: bool,
}

impl ScriptedBackend {
    fn with_script(outcomes: Vec<Result<ReasoningResponse, ReasoningError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        self.calls.lock().unwrap().push(Instant::now());
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ReasoningResponse::text(format!("re: {}", request.user_prompt))))
    }
}

fn gateway(backend: &Arc<ScriptedBackend>) -> ReasoningGateway {
    ReasoningGateway::new(Arc::clone(backend) as Arc<dyn ReasoningBackend>, GatewayConfig::default())
}

fn request(prompt: &str) -> ReasoningRequest {
    ReasoningRequest::new("You are a shopping assistant.", prompt)
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_calls_respect_min_interval() {
    let backend = Arc::new(ScriptedBackend::default());
    let gateway = gateway(&backend);

    gateway.call("first", &request("iphone")).await.unwrap();
    gateway.call("second", &request("switch")).await.unwrap();

    let times = backend.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= gateway.config().min_interval());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_are_serialized() {
    let backend = Arc::new(ScriptedBackend::default());
    let gateway = gateway(&backend);
    let (a, b, c) = (request("camera"), request("watch"), request("bag"));

    let (ra, rb, rc) = tokio::join!(
        gateway.call("a", &a),
        gateway.call("b", &b),
        gateway.call("c", &c),
    );
    assert!(ra.is_ok() && rb.is_ok() && rc.is_ok());

    let mut times = backend.call_times();
    times.sort();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= gateway.config().min_interval());
    }
}

#[tokio::test(start_paused = true)]
async fn test_waiting_caller_picks_up_cached_answer() {
    let backend = Arc::new(ScriptedBackend::default());
    let gateway = gateway(&backend);
    let req = request("airpods");

    let (first, second) = tokio::join!(gateway.call("same", &req), gateway.call("same", &req));

    let sources = [first.unwrap().source, second.unwrap().source];
    assert!(sources.contains(&ReplySource::Fresh));
    assert!(sources.contains(&ReplySource::Cached));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_serves_cached_fallback_then_retries() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![Err(ReasoningError::RateLimited {
        retry_after_secs: Some(30),
    })]));
    let gateway = gateway(&backend);
    let req = request("rolex");

    let degraded: GatewayReply = gateway.call("k", &req).await.unwrap();
    assert!(degraded.is_degraded());
    assert_eq!(degraded.source, ReplySource::Fresh);
    assert_eq!(degraded.response.content, gateway.config().fallback_content);
    assert!(degraded.degraded.as_ref().is_some_and(ReasoningError::is_rate_limited));

    let cached = gateway.call("k", &req).await.unwrap();
    assert!(cached.is_degraded());
    assert_eq!(cached.source, ReplySource::Cached);
    assert_eq!(backend.call_count(), 1);

    tokio::time::advance(gateway.config().error_ttl()).await;
    let recovered = gateway.call("k", &req).await.unwrap();
    assert!(!recovered.is_degraded());
    assert_eq!(recovered.response.content, "re: rolex");
    assert_eq!(backend.call_count(), 2);
    assert_eq!(gateway.stats().degraded_replies, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_keeps_previous_timestamp() {
    let backend = Arc::new(ScriptedBackend::default());
    let gateway = gateway(&backend);

    gateway.call("first", &request("macbook")).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });
    let err = gateway
        .call_with_cancellation("second", &request("playstation"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ReasoningError::Cancelled);
    assert_eq!(backend.call_count(), 1);

    gateway.call("third", &request("supreme")).await.unwrap();
    let times = backend.call_times();
    let gap = times[1] - times[0];
    assert!(gap >= gateway.config().min_interval());
    assert!(gap < gateway.config().min_interval() + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_cached_as_error() {
    let backend = Arc::new(ScriptedBackend::hanging());
    let gateway = gateway(&backend);
    let req = request("chanel");

    let err = gateway.call("k", &req).await.unwrap_err();
    assert_eq!(
        err,
        ReasoningError::Timeout {
            after_ms: gateway.config().call_timeout_secs * 1_000
        }
    );

    let again = gateway.call("k", &req).await.unwrap_err();
    assert!(matches!(again, ReasoningError::Timeout { .. }));
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_protocol_error_expires_after_error_ttl() {
    let backend = Arc::new(ScriptedBackend::with_script(vec![Err(ReasoningError::protocol(
        "unexpected response shape",
    ))]));
    let gateway = gateway(&backend);
    let req = request("louis vuitton");

    assert!(matches!(
        gateway.call("k", &req).await,
        Err(ReasoningError::Protocol(_))
    ));
    assert!(matches!(
        gateway.call("k", &req).await,
        Err(ReasoningError::Protocol(_))
    ));
    assert_eq!(backend.call_count(), 1);

    tokio::time::advance(gateway.config().error_ttl()).await;
    let reply = gateway.call("k", &req).await.unwrap();
    assert_eq!(reply.source, ReplySource::Fresh);
    assert_eq!(backend.call_count(), 2);

    let stats = gateway.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 2);
    assert_eq!(stats.upstream_calls, 2);
}
