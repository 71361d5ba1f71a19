// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model client trait: one HTTP round-trip to the LLM API with one key.
//!
//! The gateway owns serialization, spacing, and key rotation; the client
//! only performs a single attempt and classifies the outcome into the typed
//! error kinds the rotation logic switches on.

use async_trait::async_trait;

use crate::error::AttacheError;
use crate::types::ModelReply;

/// A single message in the model conversation format.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

/// A fully assembled request for one model call.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
    pub max_tokens: u32,
    /// Tool definitions in the provider's wire format, when the call may
    /// produce a tool invocation.
    pub tools: Option<Vec<serde_json::Value>>,
}

/// Outcome of one model call.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ModelReply,
    pub model: String,
}

/// One attempt against the model API with one credential.
///
/// Implementations must map provider failures onto the typed variants:
/// `RateLimited` (429 / quota), `Overloaded` (503 / overloaded),
/// `InvalidCredential` (400/401/403 / API_KEY_INVALID), `Transport`
/// for everything else transient.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        api_key: &str,
        request: &ModelRequest,
    ) -> Result<ModelResponse, AttacheError>;
}
