/// LLM Client: the single point of entry for all generative-text calls in Slate.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API or the
/// conversational agent directly. All outbound generation goes through here.
///
/// Model: claude-sonnet-4-5 (hardcoded, not configurable)
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod agent;
pub mod extract;

pub use agent::{AgentClient, AgentError, AgentReply};
pub use extract::{extract_json_object, ExtractError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all structured-completion calls in Slate.
pub const MODEL: &str = "claude-sonnet-4-5";

/// Upstream bodies are cut to this many characters before they reach an error message.
pub(crate) const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("ANTHROPIC_API_KEY is not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("request aborted after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Per-call parameters. Each pipeline owns its own budget and deadline.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Raw candidate output of a structured-completion call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: &'static str,
}

/// Client for the stage-2 structured-completion endpoint.
///
/// There is no retry loop: a failed call fails the run, and the caller starts a
/// new run (with negative exemplars) instead.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl LlmClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_endpoint(api_key, ANTHROPIC_API_URL)
    }

    pub fn with_endpoint(api_key: Option<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            endpoint: endpoint.into(),
        }
    }

    /// Sends `prompt` as a single user message and returns the first text block.
    ///
    /// The call is bounded by `params.timeout`; expiry yields `LlmError::Timeout`.
    pub async fn complete(
        &self,
        prompt: &str,
        params: CompletionParams,
    ) -> Result<Completion, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        match tokio::time::timeout(params.timeout, self.send(api_key, prompt, params)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(params.timeout)),
        }
    }

    async fn send(
        &self,
        api_key: &str,
        prompt: &str,
        params: CompletionParams,
    ) -> Result<Completion, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate(&body, ERROR_BODY_LIMIT));
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;
        if let Some(usage) = &llm_response.usage {
            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        let text = llm_response.text().ok_or(LlmError::EmptyContent)?;
        Ok(Completion {
            text: text.to_string(),
            model: MODEL,
        })
    }
}

/// Cuts `s` to at most `max` characters, marking the cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(timeout_ms: u64) -> CompletionParams {
        CompletionParams {
            max_tokens: 512,
            temperature: 0.5,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": MODEL,
                "max_tokens": 512,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "tool_use"},
                    {"type": "text", "text": "world"}
                ],
                "usage": {"input_tokens": 3, "output_tokens": 1}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_endpoint(Some("sk-test".into()), server.uri());
        let completion = client.complete("hello", params(5_000)).await.unwrap();
        assert_eq!(completion.text, "world");
        assert_eq!(completion.model, MODEL);
    }

    #[tokio::test]
    async fn test_non_2xx_wraps_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "max_tokens too large"}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_endpoint(Some("sk-test".into()), server.uri());
        let err = client.complete("hello", params(5_000)).await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "max_tokens too large");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"content": []})),
            )
            .mount(&server)
            .await;

        let client = LlmClient::with_endpoint(Some("sk-test".into()), server.uri());
        let err = client.complete("hello", params(50)).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_call() {
        let server = MockServer::start().await;
        let client = LlmClient::with_endpoint(None, server.uri());
        let err = client.complete("hello", params(5_000)).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_response_without_text_block_is_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
            .mount(&server)
            .await;

        let client = LlmClient::with_endpoint(Some("sk-test".into()), server.uri());
        let err = client.complete("hello", params(5_000)).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[test]
    fn test_truncate_marks_cut() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
