//! Chat-completions backend over HTTPS

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{ReasoningBackend, ReasoningError, ReasoningRequest, ReasoningResponse, ToolCall};
use crate::infrastructure::config::GatewayConfig;

const ERROR_BODY_EXCERPT: usize = 300;

pub struct OpenAiChatBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
}

impl std::fmt::Debug for OpenAiChatBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatBackend")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiChatBackend {
    /// Reads the API key from the environment variable named in the config
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ReasoningError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ReasoningError::protocol(format!("environment variable {} is not set", config.api_key_env))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(config.call_timeout())
            .build()
            .map_err(|e| ReasoningError::protocol(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: config.call_timeout_secs.saturating_mul(1_000),
        })
    }

    fn request_body(&self, request: &ReasoningRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt},
            ],
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

fn parse_completion(body: &str) -> Result<ReasoningResponse, ReasoningError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| ReasoningError::protocol(format!("malformed completion: {e}")))?;
    let message = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ReasoningError::protocol("completion has no choices"))?
        .message;

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(ReasoningResponse {
        content: message.content.unwrap_or_default(),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    })
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiChatBackend {
    async fn complete(&self, request: &ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout {
                        after_ms: self.timeout_ms,
                    }
                } else {
                    ReasoningError::protocol(e)
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(ReasoningError::RateLimited { retry_after_secs });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ReasoningError::protocol(format!("failed to read body: {e}")))?;
        if !status.is_success() {
            return Err(ReasoningError::protocol(format!(
                "HTTP {status}: {}",
                excerpt(&body)
            )));
        }

        debug!("Completion received ({} bytes)", body.len());
        parse_completion(&body)
    }
}
