// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Messages API.
//!
//! Performs exactly one attempt per call and classifies failures into the
//! typed error kinds the gateway's rotation logic switches on. The API key
//! is a per-request header because the gateway rotates keys between calls.

use std::time::Duration;

use async_trait::async_trait;
use attache_core::{AttacheError, ModelClient, ModelReply, ModelRequest, ModelResponse};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::types::{ApiErrorResponse, ApiMessage, MessageRequest, MessageResponse, ResponseContentBlock};

/// Base URL for the Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Cooldown assumed when a 429 carries no usable retry hint.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for Messages API communication.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpModelClient {
    /// Creates a new API client with the given API version header.
    pub fn new(api_version: &str) -> Result<Self, AttacheError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                AttacheError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| AttacheError::Transport {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn to_wire_request(request: &ModelRequest) -> MessageRequest {
        MessageRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            system: request.system.clone(),
            max_tokens: request.max_tokens,
            tools: request.tools.clone(),
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, AttacheError> {
        let wire = Self::to_wire_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| AttacheError::Transport {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, "model response received");

        if status.is_success() {
            let body = response.text().await.map_err(|e| AttacheError::Transport {
                message: format!("failed to read response body: {e}"),
                source: Some(Box::new(e)),
            })?;
            let parsed: MessageResponse =
                serde_json::from_str(&body).map_err(|e| AttacheError::Parse(format!(
                    "failed to parse API response: {e}"
                )))?;
            return Ok(ModelResponse {
                reply: reply_from_blocks(parsed.content),
                model: parsed.model,
            });
        }

        let retry_after_header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status.as_u16(), retry_after_header, &body))
    }
}

/// Maps response content blocks onto a [`ModelReply`]. A tool_use block wins
/// over any accompanying text; multiple text blocks are concatenated.
fn reply_from_blocks(blocks: Vec<ResponseContentBlock>) -> ModelReply {
    for block in &blocks {
        if let ResponseContentBlock::ToolUse { name, input, .. } = block {
            return ModelReply::ToolCall {
                name: name.clone(),
                args: input.clone(),
            };
        }
    }
    let text = blocks
        .iter()
        .filter_map(|block| match block {
            ResponseContentBlock::Text { text } => Some(text.as_str()),
            ResponseContentBlock::ToolUse { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("");
    ModelReply::Text(text.trim().to_string())
}

/// Classifies a non-success API outcome into the typed error kinds.
///
/// Status codes win; the body text is the fallback signal for proxies that
/// mangle statuses.
fn classify_error(status: u16, retry_after_header: Option<u64>, body: &str) -> AttacheError {
    let message = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.type_, envelope.error.message),
        Err(_) => format!("API returned {status}: {body}"),
    };

    match status {
        429 => AttacheError::RateLimited {
            retry_after: Duration::from_secs(
                retry_after_header
                    .or_else(|| extract_retry_after_secs(body))
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            ),
        },
        503 | 529 => AttacheError::Overloaded,
        400 | 401 | 403 => AttacheError::InvalidCredential(message),
        _ => {
            let lowered = body.to_lowercase();
            if lowered.contains("quota") || lowered.contains("429") {
                AttacheError::RateLimited {
                    retry_after: Duration::from_secs(
                        extract_retry_after_secs(body).unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                    ),
                }
            } else if lowered.contains("overloaded") || lowered.contains("503") {
                AttacheError::Overloaded
            } else if body.contains("API_KEY_INVALID") {
                AttacheError::InvalidCredential(message)
            } else {
                AttacheError::Transport {
                    message,
                    source: None,
                }
            }
        }
    }
}

/// Pulls a `"retry_after": N` hint out of an error body, if present.
fn extract_retry_after_secs(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("retry_after"))
        .or_else(|| value.get("retry_after"))
        .and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache_core::ModelMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> HttpModelClient {
        HttpModelClient::new("2023-06-01")
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn test_request() -> ModelRequest {
        ModelRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: Some("You answer briefly.".into()),
            messages: vec![ModelMessage {
                role: "user".into(),
                content: "Hello".into(),
            }],
            max_tokens: 256,
            tools: None,
        }
    }

    #[tokio::test]
    async fn text_response_is_trimmed_and_joined() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "  Hello "},
                {"type": "text", "text": "there!  "}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 3}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.complete("sk-test", &test_request()).await.unwrap();
        assert_eq!(
            response.reply,
            ModelReply::Text("Hello there!".to_string())
        );
    }

    #[tokio::test]
    async fn tool_use_block_wins_over_text() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "msg_2",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "get_system_status",
                 "input": {"verbose": true}}
            ],
            "model": "claude-sonnet-4-20250514",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 5, "output_tokens": 3}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.complete("sk-test", &test_request()).await.unwrap();
        match response.reply {
            ModelReply::ToolCall { name, args } => {
                assert_eq!(name, "get_system_status");
                assert_eq!(args["verbose"], true);
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_429_classifies_as_rate_limited_with_header_hint() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "error": {"type": "rate_limit_error", "message": "quota exceeded"}
        });
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "10")
                    .set_body_json(&body),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete("sk-test", &test_request()).await.unwrap_err();
        match err {
            AttacheError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(10));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_503_classifies_as_overloaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete("sk-test", &test_request()).await.unwrap_err();
        assert!(matches!(err, AttacheError::Overloaded));
    }

    #[tokio::test]
    async fn http_401_classifies_as_invalid_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete("bad-key", &test_request()).await.unwrap_err();
        assert!(matches!(err, AttacheError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn unclassified_failure_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete("sk-test", &test_request()).await.unwrap_err();
        assert!(matches!(err, AttacheError::Transport { .. }));
    }

    #[test]
    fn body_text_classification_fallbacks() {
        assert!(matches!(
            classify_error(500, None, r#"{"message":"quota exhausted for project"}"#),
            AttacheError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error(500, None, "model overloaded, try later"),
            AttacheError::Overloaded
        ));
        assert!(matches!(
            classify_error(500, None, r#"{"error":{"type":"x","message":"API_KEY_INVALID"}}"#),
            AttacheError::InvalidCredential(_)
        ));
    }

    #[test]
    fn retry_after_extraction_from_body() {
        assert_eq!(
            extract_retry_after_secs(r#"{"error":{"retry_after": 25}}"#),
            Some(25)
        );
        assert_eq!(extract_retry_after_secs(r#"{"retry_after": 7}"#), Some(7));
        assert_eq!(extract_retry_after_secs("not json"), None);
    }
}
