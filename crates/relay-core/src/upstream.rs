//! OpenRouter chat-completions client: one bounded attempt per call

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::types::{AttemptOutcome, Conversation, GenerationParams, ModelCandidate, is_truthy};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply used when upstream answers 200 without any completion text
pub const EMPTY_COMPLETION_REPLY: &str = "⚠️ No response from OpenRouter.";

const UNKNOWN_ERROR: &str = "Unknown error";

/// Why an attempt produced no usable response
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request aborted after {0:?} timeout")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to parse response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Everything one attempt needs
#[derive(Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub api_key: &'a str,
    pub model: &'a ModelCandidate,
    pub conversation: &'a Conversation,
    pub params: &'a GenerationParams,
}

/// A single bounded call to the aggregation service. Implementations never retry.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn attempt(&self, request: AttemptRequest<'_>) -> AttemptOutcome;
}

/// HTTP client for the OpenRouter chat-completions endpoint
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenRouterClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(
        &self,
        request: AttemptRequest<'_>,
    ) -> std::result::Result<(StatusCode, Value), TransportError> {
        let body = OutboundRequest {
            model: request.model.as_str(),
            messages: request.conversation,
            temperature: &request.params.temperature,
            top_p: &request.params.top_p,
            max_tokens: &request.params.max_tokens,
            stream: false,
        };

        debug!(
            "OpenRouter request: model={}, messages={}",
            request.model,
            request.conversation.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", request.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes)?;

        debug!("OpenRouter response: model={}, status={}", request.model, status);

        Ok((status, payload))
    }
}

#[async_trait]
impl UpstreamClient for OpenRouterClient {
    async fn attempt(&self, request: AttemptRequest<'_>) -> AttemptOutcome {
        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Err(_) => AttemptOutcome::TransportError(TransportError::Timeout(self.timeout)),
            Ok(Err(e)) => AttemptOutcome::TransportError(e),
            Ok(Ok((status, payload))) => classify(status, payload),
        }
    }
}

/// Turn a parsed upstream response into an attempt outcome.
///
/// Only `choices[0].message.content` and `error.message` are read; the rest
/// of the payload may have any shape.
fn classify(status: StatusCode, payload: Value) -> AttemptOutcome {
    if status.is_success() {
        let reply = payload
            .pointer("/choices/0/message/content")
            .and_then(field_text)
            .unwrap_or_else(|| EMPTY_COMPLETION_REPLY.to_string());
        return AttemptOutcome::Success(reply);
    }

    let message = payload
        .pointer("/error/message")
        .and_then(field_text)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string());

    AttemptOutcome::UpstreamError {
        status: status.as_u16(),
        message,
    }
}

/// Text of a response field. Falsy values read as absent; other non-strings
/// are rendered as JSON.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => (!s.is_empty()).then(|| s.clone()),
        other => is_truthy(other).then(|| other.to_string()),
    }
}

// ── OpenRouter wire types ──

#[derive(Debug, Serialize)]
struct OutboundRequest<'a> {
    model: &'a str,
    messages: &'a Conversation,
    temperature: &'a Value,
    top_p: &'a Value,
    max_tokens: &'a Value,
    stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRole, ChatTurn};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn conversation() -> Conversation {
        Conversation::new(vec![
            ChatTurn::new(ChatRole::System, "sys"),
            ChatTurn::new(ChatRole::User, "hello"),
        ])
    }

    async fn run_attempt(client: &OpenRouterClient, model: &str) -> AttemptOutcome {
        let model = ModelCandidate::from(model);
        let conversation = conversation();
        let params = GenerationParams::default();
        client
            .attempt(AttemptRequest {
                api_key: "test-key",
                model: &model,
                conversation: &conversation,
                params: &params,
            })
            .await
    }

    #[test]
    fn test_classify_success() {
        let outcome = classify(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": "hi there"}}]}),
        );
        assert!(matches!(outcome, AttemptOutcome::Success(ref r) if r == "hi there"));
    }

    #[test]
    fn test_classify_empty_completion_is_success() {
        for payload in [
            json!({"choices": []}),
            json!({"choices": [{"message": {"content": ""}}]}),
            json!({"choices": [{"message": {}}]}),
            json!({}),
            json!({"choices": "weird"}),
        ] {
            let outcome = classify(StatusCode::OK, payload);
            assert!(
                matches!(outcome, AttemptOutcome::Success(ref r) if r == EMPTY_COMPLETION_REPLY)
            );
        }
    }

    #[test]
    fn test_classify_error_message_from_payload() {
        let outcome = classify(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "rate limited"}}),
        );
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 429, ref message } if message == "rate limited"
        ));
    }

    #[test]
    fn test_classify_error_falls_back_to_reason() {
        let outcome = classify(StatusCode::BAD_GATEWAY, json!({"detail": "nope"}));
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 502, ref message } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_classify_error_unknown_status() {
        let status = StatusCode::from_u16(599).unwrap();
        let outcome = classify(status, json!(null));
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 599, ref message } if message == "Unknown error"
        ));
    }

    #[test]
    fn test_classify_reads_only_first_choice() {
        let outcome = classify(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": "hi"}}, 5], "usage": "n/a"}),
        );
        assert!(matches!(outcome, AttemptOutcome::Success(ref r) if r == "hi"));

        let outcome = classify(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": "hi", "role": 7}, "index": "zero"}]}),
        );
        assert!(matches!(outcome, AttemptOutcome::Success(ref r) if r == "hi"));
    }

    #[test]
    fn test_classify_non_string_content_is_rendered() {
        let outcome = classify(
            StatusCode::OK,
            json!({"choices": [{"message": {"content": [{"type": "text", "text": "hi"}]}}]}),
        );
        assert!(matches!(
            outcome,
            AttemptOutcome::Success(ref r) if r == r#"[{"text":"hi","type":"text"}]"#
        ));
    }

    #[test]
    fn test_classify_non_string_error_message_is_surfaced() {
        let outcome = classify(
            StatusCode::BAD_REQUEST,
            json!({"error": {"message": {"code": "bad_model"}, "code": 400}}),
        );
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 400, ref message }
                if message == r#"{"code":"bad_model"}"#
        ));

        let outcome = classify(StatusCode::TOO_MANY_REQUESTS, json!({"error": {"message": 42}}));
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 429, ref message } if message == "42"
        ));
    }

    #[test]
    fn test_classify_falsy_error_message_falls_back_to_reason() {
        for payload in [
            json!({"error": {"message": ""}}),
            json!({"error": {"message": null}}),
            json!({"error": {"message": false}}),
            json!({"error": "flat string"}),
        ] {
            let outcome = classify(StatusCode::SERVICE_UNAVAILABLE, payload);
            assert!(matches!(
                outcome,
                AttemptOutcome::UpstreamError { status: 503, ref message }
                    if message == "Service Unavailable"
            ));
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            OpenRouterClient::new("https://openrouter.ai/api/v1/", DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_attempt_sends_wire_format() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({
                "model": "vendor/model-a:free",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"},
                ],
                "temperature": 0.7,
                "top_p": 1,
                "max_tokens": 4096,
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = OpenRouterClient::new(mock_server.uri(), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let outcome = run_attempt(&client, "vendor/model-a:free").await;
        assert!(matches!(outcome, AttemptOutcome::Success(ref r) if r == "hi there"));
    }

    #[tokio::test]
    async fn test_attempt_upstream_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "rate limited"}})),
            )
            .mount(&mock_server)
            .await;

        let client = OpenRouterClient::new(mock_server.uri(), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let outcome = run_attempt(&client, "m").await;
        assert!(matches!(
            outcome,
            AttemptOutcome::UpstreamError { status: 429, ref message } if message == "rate limited"
        ));
    }

    #[tokio::test]
    async fn test_attempt_non_json_body_is_transport_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>down</html>"))
            .mount(&mock_server)
            .await;

        let client = OpenRouterClient::new(mock_server.uri(), DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let outcome = run_attempt(&client, "m").await;
        assert!(matches!(
            outcome,
            AttemptOutcome::TransportError(TransportError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_attempt_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = OpenRouterClient::new(mock_server.uri(), Duration::from_millis(50)).unwrap();
        let outcome = run_attempt(&client, "m").await;
        match outcome {
            AttemptOutcome::TransportError(e @ TransportError::Timeout(_)) => {
                assert!(e.to_string().contains("timeout"));
            }
            other => panic!("expected timeout, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_attempt_connection_refused() {
        // Nothing listens on the discard port
        let client =
            OpenRouterClient::new("http://127.0.0.1:9", DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let outcome = run_attempt(&client, "m").await;
        assert!(matches!(
            outcome,
            AttemptOutcome::TransportError(TransportError::Request(_))
        ));
    }

    #[test]
    fn test_debug_output() {
        let client = OpenRouterClient::new(DEFAULT_BASE_URL, DEFAULT_ATTEMPT_TIMEOUT).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("openrouter.ai"));
    }
}
