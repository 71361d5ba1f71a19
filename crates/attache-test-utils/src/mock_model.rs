// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model client for deterministic testing.
//!
//! Outcomes are popped from a FIFO queue; when the queue is empty a default
//! text reply is returned. Every call is journaled with the key it used, so
//! tests can assert rotation behavior.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use attache_core::{AttacheError, ModelClient, ModelReply, ModelRequest, ModelResponse};
use tokio::sync::Mutex;

/// One journaled model call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub api_key: String,
    pub request: ModelRequest,
}

/// A mock LLM client that returns pre-configured outcomes.
pub struct MockModelClient {
    outcomes: Mutex<VecDeque<Result<ModelReply, AttacheError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockModelClient {
    /// Create a mock with an empty outcome queue.
    pub fn new() -> Arc<Self> {
        Self::with_outcomes(Vec::new())
    }

    /// Create a mock pre-loaded with outcomes.
    pub fn with_outcomes(outcomes: Vec<Result<ModelReply, AttacheError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Queue a plain text reply.
    pub async fn script_text(&self, text: &str) {
        self.outcomes
            .lock()
            .await
            .push_back(Ok(ModelReply::Text(text.to_string())));
    }

    /// Queue a tool call.
    pub async fn script_tool_call(&self, name: &str, args: serde_json::Value) {
        self.outcomes.lock().await.push_back(Ok(ModelReply::ToolCall {
            name: name.to_string(),
            args,
        }));
    }

    /// Queue an error outcome.
    pub async fn script_error(&self, error: AttacheError) {
        self.outcomes.lock().await.push_back(Err(error));
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// The journal of calls (key + request), in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// The API keys used, in call order.
    pub async fn keys_used(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|c| c.api_key.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(
        &self,
        api_key: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, AttacheError> {
        self.calls.lock().await.push(RecordedCall {
            api_key: api_key.to_string(),
            request: request.clone(),
        });
        let outcome = self
            .outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::Text("mock reply".to_string())));
        outcome.map(|reply| ModelResponse {
            reply,
            model: request.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache_core::ModelMessage;

    fn request() -> ModelRequest {
        ModelRequest {
            model: "test-model".into(),
            system: None,
            messages: vec![ModelMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            max_tokens: 64,
            tools: None,
        }
    }

    #[tokio::test]
    async fn outcomes_pop_in_order_then_default() {
        let mock = MockModelClient::new();
        mock.script_text("first").await;
        mock.script_tool_call("get_current_time", serde_json::json!({})).await;

        let r1 = mock.complete("k", &request()).await.unwrap();
        assert_eq!(r1.reply, ModelReply::Text("first".into()));

        let r2 = mock.complete("k", &request()).await.unwrap();
        assert!(matches!(r2.reply, ModelReply::ToolCall { .. }));

        let r3 = mock.complete("k", &request()).await.unwrap();
        assert_eq!(r3.reply, ModelReply::Text("mock reply".into()));
    }

    #[tokio::test]
    async fn journal_records_keys() {
        let mock = MockModelClient::new();
        mock.complete("kA", &request()).await.unwrap();
        mock.complete("kB", &request()).await.unwrap();
        assert_eq!(mock.keys_used().await, vec!["kA", "kB"]);
        assert_eq!(mock.call_count().await, 2);
    }
}
