//! HTTP client for OpenAI-compatible chat completions
//!
//! Whole replies walk the configured model list, moving on when a model is
//! unavailable or rate limited. A 429 is first retried on the same model with
//! exponential backoff. Streams always use the default model.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client as HttpClient, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::provider::{LanguageModel, TextStream};
use super::streaming::{SseLineBuffer, StreamEvent};
use super::types::{ChatRequest, ChatResponse, LlmResponse, Message};

/// Attempts per model when rate limited
const MAX_ATTEMPTS: u32 = 3;

const BACKOFF_BASE_MS: u64 = 500;

/// Cheap to clone; clones share one connection pool
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("endpoint", &self.endpoint)
            .field("default_model", &self.config.default_model)
            .finish()
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("API key is required".to_string()));
        }

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            http_client,
            config,
            api_key,
            endpoint,
        })
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    /// Default model first, then the configured fallbacks
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.default_model.as_str())
            .chain(self.config.fallback_models.iter().map(String::as_str))
    }

    /// One whole completion from `model` (default model when `None`)
    pub async fn complete(&self, messages: &[Message], model: Option<&str>) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.config.default_model);
        let request = ChatRequest::new(&self.config, model, messages);

        let mut attempt = 1;
        loop {
            let result = match self.post(&request).await {
                Ok(response) => read_reply(response, model).await,
                Err(e) => Err(e),
            };
            match result {
                Err(Error::RateLimited(hint)) if attempt < MAX_ATTEMPTS => {
                    let wait = backoff(attempt, hint);
                    warn!(model, attempt, wait_ms = wait.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Whole completion, moving down the model list on model-specific failures
    pub async fn complete_with_fallback(&self, messages: &[Message]) -> Result<LlmResponse> {
        let mut last_error = None;

        for model in self.models() {
            match self.complete(messages, Some(model)).await {
                Ok(reply) => {
                    info!(model = %reply.model, tokens = reply.tokens_used, "Completion received");
                    return Ok(reply);
                }
                Err(e) if is_recoverable(&e) => {
                    warn!(model, error = %e, "Model unusable, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoSuitableModel("no models configured".to_string())))
    }

    /// Streamed completion from the default model
    ///
    /// Yields the text of each content delta in order. The stream ends at
    /// `[DONE]` or when the server closes the body; an unparseable event ends
    /// it with a `MalformedOutput` item.
    pub async fn complete_streaming(&self, messages: &[Message]) -> Result<TextStream> {
        let request = ChatRequest::new(&self.config, &self.config.default_model, messages).streaming();
        let response = self.post(&request).await?;

        let stream = async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            'read: while let Some(read) = body.next().await {
                let bytes = match read {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(Error::NetworkError(e));
                        break;
                    }
                };
                for event in lines.push(&bytes) {
                    match event {
                        StreamEvent::Chunk(chunk) => {
                            if let Some(text) = chunk.content().filter(|t| !t.is_empty()) {
                                yield Ok(text.to_string());
                            }
                        }
                        StreamEvent::Done => break 'read,
                        StreamEvent::Error(msg) => {
                            yield Err(Error::MalformedOutput(msg));
                            break 'read;
                        }
                    }
                }
            }

            if let Some(StreamEvent::Chunk(chunk)) = lines.finish() {
                if let Some(text) = chunk.content().filter(|t| !t.is_empty()) {
                    yield Ok(text.to_string());
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Send one request; non-success statuses become errors
    async fn post(&self, request: &ChatRequest<'_>) -> Result<Response> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        Ok(self.complete_with_fallback(messages).await?.content)
    }

    async fn generate_stream(&self, messages: &[Message]) -> Result<TextStream> {
        self.complete_streaming(messages).await
    }

    fn model_name(&self) -> &str {
        self.default_model()
    }
}

async fn read_reply(response: Response, model: &str) -> Result<LlmResponse> {
    let parsed: ChatResponse = response
        .json()
        .await
        .map_err(|e| Error::MalformedOutput(format!("completion body: {}", e)))?;
    parsed
        .into_reply(model)
        .ok_or_else(|| Error::LLMError("completion carried no text".to_string()))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 => Error::LLMError(
            "Unauthorized: invalid API key. Set AUSVISA_API_KEY or GOOGLE_API_KEY.".to_string(),
        ),
        429 => Error::RateLimited(retry_after(body).unwrap_or(2)),
        404 => Error::LLMError(format!("Model not found or endpoint unavailable: {}", body)),
        400..=499 => Error::LLMError(format!("Request rejected ({}): {}", status, body)),
        _ => Error::LLMError(format!("Server error ({}): {}", status, body)),
    }
}

/// Failures worth retrying on another model
fn is_recoverable(error: &Error) -> bool {
    match error {
        Error::RateLimited(_) => true,
        Error::LLMError(msg) => {
            let msg = msg.to_lowercase();
            [
                "model not found",
                "unavailable",
                "not available",
                "overloaded",
                "capacity",
                "resource_exhausted",
            ]
            .iter()
            .any(|pattern| msg.contains(pattern))
        }
        _ => false,
    }
}

/// Exponential backoff, never shorter than the server's hint
fn backoff(attempt: u32, hint_secs: u64) -> Duration {
    let exponential = BACKOFF_BASE_MS << (attempt.saturating_sub(1));
    Duration::from_millis(exponential.max(hint_secs * 1000))
}

/// `retry_after` seconds from an error body, top level or under `error`
fn retry_after(body: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(serde_json::Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            api_key: None,
            default_model: "gemini-2.5-flash".to_string(),
            fallback_models: vec!["gemini-2.0-flash".to_string()],
            temperature: 0.4,
            max_tokens: 1024,
            timeout_secs: 30,
            base_url: "https://example.com/v1/".to_string(),
        }
    }

    #[test]
    fn test_endpoint_and_models() {
        let client = LlmClient::new(test_config(), "test-key").unwrap();
        assert_eq!(client.endpoint, "https://example.com/v1/chat/completions");
        assert_eq!(
            client.models().collect::<Vec<_>>(),
            vec!["gemini-2.5-flash", "gemini-2.0-flash"]
        );
    }

    #[test]
    fn test_requires_api_key() {
        assert!(LlmClient::new(test_config(), "").is_err());
        assert!(LlmClient::new(test_config(), "  ").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let client = LlmClient::new(test_config(), "secret-key").unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("gemini-2.5-flash"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(is_recoverable(&Error::RateLimited(1)));
        assert!(is_recoverable(&Error::LLMError("Model not found".to_string())));
        assert!(is_recoverable(&Error::LLMError(
            "Server error (503): RESOURCE_EXHAUSTED".to_string()
        )));
        assert!(!is_recoverable(&Error::LLMError("Unauthorized".to_string())));
        assert!(!is_recoverable(&Error::MalformedOutput("x".to_string())));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, r#"{"retry_after": 7}"#),
            Error::RateLimited(7)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            Error::RateLimited(2)
        ));
        assert!(is_recoverable(&status_error(StatusCode::NOT_FOUND, "")));
        assert!(!is_recoverable(&status_error(StatusCode::BAD_REQUEST, "bad")));
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff(1, 0), Duration::from_millis(500));
        assert_eq!(backoff(3, 0), Duration::from_millis(2000));
        assert_eq!(backoff(1, 5), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(retry_after(r#"{"retry_after": 30}"#), Some(30));
        assert_eq!(retry_after(r#"{"error": {"retry_after": 60}}"#), Some(60));
        assert_eq!(retry_after(r#"{"message": "slow down"}"#), None);
        assert_eq!(retry_after("not json"), None);
    }
}
