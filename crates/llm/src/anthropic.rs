//! Anthropic Messages API provider.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline::{
    Completion, CompletionError, CompletionService, RetryPolicy, StepRequest, TokenCount,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{AnthropicConfig, LlmError};

/// Value of the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Non-standard status Anthropic returns when the API is overloaded.
const OVERLOADED: u16 = 529;

/// [`CompletionService`] backed by the Anthropic Messages API.
///
/// Retryable failures (rate limits, server errors, network errors, timeouts)
/// are retried up to `max_retries` times with exponential back-off before
/// being returned.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
    api_key: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("config", &self.config)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AnthropicProvider {
    /// Creates a provider with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfiguration`] if `config` fails validation,
    /// or [`LlmError::ClientBuild`] if the HTTP client cannot be constructed.
    pub fn new(config: AnthropicConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(30))
            .use_rustls_tls()
            .build()
            .map_err(|e| LlmError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    /// Creates a provider reading the API key from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] if the variable is unset or blank,
    /// otherwise as [`new`](Self::new).
    pub fn from_env(config: AnthropicConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey {
                env: config.api_key_env.clone(),
            })?;
        Self::new(config, api_key)
    }

    /// Returns the provider's configuration.
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn body<'a>(&self, request: &'a StepRequest) -> MessagesRequest<'a> {
        let mut content: Vec<ContentBlock<'a>> = request
            .images()
            .iter()
            .map(|image| ContentBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: image.media_type(),
                    data: image.data(),
                },
            })
            .collect();
        content.push(ContentBlock::Text {
            text: request.prompt(),
        });

        MessagesRequest {
            model: request.model().as_str(),
            max_tokens: self.config.max_tokens,
            temperature: request.creativity().as_f64(),
            system: request.system(),
            messages: vec![Message {
                role: "user",
                content,
            }],
        }
    }

    async fn send_once(&self, body: &MessagesRequest<'_>) -> Result<Completion, CompletionError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            CompletionError::connection(format!("Failed to parse Anthropic response: {e}"))
        })?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if text.is_empty() {
            return Err(CompletionError::connection(
                "Anthropic response missing text content",
            ));
        }

        let completion = Completion::new(text);
        Ok(match parsed.usage {
            Some(usage) => completion.with_usage(
                TokenCount::new(usage.input_tokens),
                TokenCount::new(usage.output_tokens),
            ),
            None => completion,
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> CompletionError {
        if error.is_timeout() {
            CompletionError::connection(format!(
                "Anthropic request timed out after {}s",
                self.config.timeout_secs
            ))
        } else {
            CompletionError::connection(format!(
                "Anthropic request failed: {}",
                error.without_url()
            ))
        }
    }
}

#[async_trait]
impl CompletionService for AnthropicProvider {
    async fn complete(&self, request: &StepRequest) -> Result<Completion, CompletionError> {
        let body = self.body(request);
        let mut retry = 0;

        loop {
            debug!(
                provider = "anthropic",
                model = %request.model(),
                images = request.images().len(),
                attempt = retry + 1,
                "Invoking Anthropic Messages API"
            );

            let error = match self.send_once(&body).await {
                Ok(completion) => {
                    debug!(
                        provider = "anthropic",
                        input_tokens = ?completion.input_tokens.map(TokenCount::as_u64),
                        output_tokens = ?completion.output_tokens.map(TokenCount::as_u64),
                        "Anthropic invocation completed"
                    );
                    return Ok(completion);
                }
                Err(error) => error,
            };

            let after = match error.retry_policy() {
                RetryPolicy::Retryable { after } if retry < self.config.max_retries => after,
                _ => return Err(error),
            };

            retry += 1;
            let backoff = self.config.backoff(retry);
            let delay = after.map_or(backoff, |after| after.max(backoff));
            warn!(
                provider = "anthropic",
                kind = %error.kind(),
                retry,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retryable failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

async fn error_from_response(response: Response) -> CompletionError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_retry_after(value, Utc::now()));
    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&raw)
        .map(|envelope| envelope.error.message)
        .unwrap_or(raw);
    classify(status, retry_after, message)
}

/// Reads a `retry-after` value in either delta-seconds or HTTP-date form.
///
/// A date already in the past yields a zero delay.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some((date.with_timezone(&Utc) - now).to_std().unwrap_or_default())
}

/// Maps a non-success status to a [`CompletionError`].
fn classify(status: StatusCode, retry_after: Option<Duration>, message: String) -> CompletionError {
    let message = if message.trim().is_empty() {
        status.to_string()
    } else {
        message
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::AuthFailed { message },
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited {
            message,
            retry_after,
        },
        StatusCode::BAD_REQUEST if message.to_ascii_lowercase().contains("image") => {
            CompletionError::InvalidImage { message }
        }
        s if s.as_u16() == OVERLOADED || s.is_server_error() => {
            CompletionError::connection(format!("Anthropic returned {s}: {message}"))
        }
        s if s.is_client_error() => CompletionError::InvalidRequest { message },
        s => CompletionError::connection(format!("Unexpected status {s}: {message}")),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{CompletionErrorKind, Creativity, ImageRef, ModelId};
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer, max_retries: u32) -> AnthropicProvider {
        let config = AnthropicConfig {
            base_url: format!("{}/v1/messages", server.uri()),
            max_retries,
            initial_backoff_ms: 1,
            timeout_secs: 5,
            ..AnthropicConfig::default()
        };
        AnthropicProvider::new(config, "test-key").unwrap()
    }

    fn request() -> StepRequest {
        StepRequest::new(
            "Describe the scene",
            ModelId::new("claude-3-5-haiku-20241022").unwrap(),
            Creativity::new(0.2).unwrap(),
        )
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "usage": {"input_tokens": 12, "output_tokens": 34}
        }))
    }

    fn error_response(status: u16, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(json!({
            "type": "error",
            "error": {"type": "api_error", "message": message}
        }))
    }

    #[tokio::test]
    async fn test_successful_completion_sends_headers_and_parses_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(text_response("A quiet harbour."))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider_for(&server, 0).complete(&request()).await.unwrap();

        assert_eq!(completion.text, "A quiet harbour.");
        assert_eq!(completion.input_tokens, Some(TokenCount::new(12)));
        assert_eq!(completion.output_tokens, Some(TokenCount::new(34)));
    }

    #[tokio::test]
    async fn test_request_body_puts_images_before_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(text_response("ok"))
            .mount(&server)
            .await;

        let step = request()
            .with_system("You are an expert image analyst.")
            .with_images(vec![
                ImageRef::jpeg("AAAA").unwrap(),
                ImageRef::new("image/png", "BBBB").unwrap(),
            ]);
        provider_for(&server, 0).complete(&step).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "claude-3-5-haiku-20241022");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["system"], "You are an expert image analyst.");

        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
        assert_eq!(content[2], json!({"type": "text", "text": "Describe the scene"}));
    }

    #[tokio::test]
    async fn test_system_prompt_omitted_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(text_response("ok"))
            .mount(&server)
            .await;

        provider_for(&server, 0).complete(&request()).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.get("system").is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(error_response(401, "invalid x-api-key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider_for(&server, 2).complete(&request()).await.unwrap_err();

        assert_eq!(err.kind(), CompletionErrorKind::AuthFailed);
        assert!(err.to_string().contains("invalid x-api-key"));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(error_response(429, "rate limited").insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(text_response("after the wait"))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider_for(&server, 2).complete(&request()).await.unwrap();

        assert_eq!(completion.text, "after the wait");
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(error_response(500, "internal"))
            .expect(3)
            .mount(&server)
            .await;

        let err = provider_for(&server, 2).complete(&request()).await.unwrap_err();

        assert_eq!(err.kind(), CompletionErrorKind::ConnectionError);
    }

    #[tokio::test]
    async fn test_image_rejection_maps_to_invalid_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(error_response(400, "Could not process image"))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider_for(&server, 2).complete(&request()).await.unwrap_err();

        assert_eq!(err.kind(), CompletionErrorKind::InvalidImage);
    }

    #[tokio::test]
    async fn test_missing_text_content_is_a_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [],
                "usage": {"input_tokens": 1, "output_tokens": 0}
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server, 0).complete(&request()).await.unwrap_err();

        assert_eq!(err.kind(), CompletionErrorKind::ConnectionError);
        assert!(err.to_string().contains("missing text content"));
    }

    #[test]
    fn test_retry_after_accepts_seconds_and_http_dates() {
        let now = DateTime::parse_from_rfc3339("2026-10-21T07:27:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(parse_retry_after(" 5 ", now), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2026 07:28:30 GMT", now),
            Some(Duration::from_secs(90))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2026 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_classify_status_codes() {
        let classify_kind = |status: u16, message: &str| {
            classify(
                StatusCode::from_u16(status).unwrap(),
                None,
                message.to_string(),
            )
            .kind()
        };

        assert_eq!(classify_kind(403, "forbidden"), CompletionErrorKind::AuthFailed);
        assert_eq!(classify_kind(429, ""), CompletionErrorKind::RateLimited);
        assert_eq!(classify_kind(400, "max_tokens too large"), CompletionErrorKind::InvalidRequest);
        assert_eq!(classify_kind(404, "model not found"), CompletionErrorKind::InvalidRequest);
        assert_eq!(classify_kind(529, "overloaded"), CompletionErrorKind::ConnectionError);
        assert_eq!(classify_kind(503, ""), CompletionErrorKind::ConnectionError);
    }

    #[test]
    fn test_from_env_requires_key() {
        let config = AnthropicConfig {
            api_key_env: "CLAUDE_NODES_TEST_UNSET_API_KEY".to_string(),
            ..AnthropicConfig::default()
        };

        let err = AnthropicProvider::from_env(config).unwrap_err();

        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }
}
