// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! These types represent the rows stored in the SQLite database. All
//! timestamps are millisecond-ISO strings (`2026-08-02T12:34:56.789Z`) so
//! Rust-side and SQL-side values compare lexicographically.

use serde::{Deserialize, Serialize};

/// A known sender. Created on first inbound message, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Normalized address: digits-only phone or transport chat id.
    pub phone: String,
    /// Display name from the sender's client, if it passed validation.
    pub display_name: Option<String>,
    /// Name the contact confirmed through conversation.
    pub confirmed_name: Option<String>,
    /// Whether identity has been confirmed.
    pub verified: bool,
    /// Trust level 0-10, raised by the profiling pass.
    pub trust_level: i64,
    /// Free-text summary maintained by the profiling pass.
    pub summary: Option<String>,
    /// Platform tag ("whatsapp", "telegram").
    pub platform: String,
    pub created_at: String,
    pub last_seen_at: String,
}

/// One row of the append-only per-contact message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: String,
    pub contact_phone: String,
    /// "user" or "agent".
    pub role: String,
    pub content: String,
    pub media_kind: String,
    pub platform: String,
    pub created_at: String,
}

/// A conversation session window on one contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub contact_phone: String,
    /// "active" or "completed". The transition to completed is terminal.
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub urgency: Option<i64>,
    pub summary: Option<String>,
}

/// A persistent queue row holding one debounced batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: i64,
    pub sender: String,
    /// "reply" for debounced batches, "profile" for background profiling.
    pub kind: String,
    /// JSON array of the raw message texts in arrival order.
    pub payload: String,
    /// 0=critical, 1=high, 2=normal, 3=low.
    pub priority: i64,
    /// "pending", "processing", "completed", "failed".
    pub status: String,
    pub retry_count: i64,
    pub worker_id: Option<String>,
    pub error: Option<String>,
    /// Hash of sender+texts used to coalesce duplicate enqueues.
    pub content_hash: String,
    /// Row is invisible to the lease query before this instant.
    pub visible_at: String,
    pub leased_at: Option<String>,
    pub created_at: String,
    pub processed_at: Option<String>,
}

impl QueueItem {
    /// Decodes the payload back into the original text list.
    pub fn texts(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// A pending end-of-session summary task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportItem {
    pub id: i64,
    pub contact_phone: String,
    pub display_name: Option<String>,
    pub conversation_id: String,
    pub status: String,
    pub retry_count: i64,
    pub last_attempt_at: Option<String>,
    pub last_user_message_at: Option<String>,
    pub error: Option<String>,
    pub visible_at: String,
    pub created_at: String,
}

/// The singleton agent persona used by prompt construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiProfile {
    pub system_prompt: Option<String>,
    pub identity_name: Option<String>,
    pub identity_role: Option<String>,
    pub traits: Option<String>,
    pub instructions: Option<String>,
    pub greeting: Option<String>,
    /// "short" constrains reply length in the prompt.
    pub response_length: Option<String>,
}

/// The singleton owner profile injected into prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub profession: Option<String>,
    pub availability: Option<String>,
    pub notes: Option<String>,
}

/// One concurrency-controller sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub id: i64,
    pub sampled_at: String,
    pub depth: i64,
    pub workers: i64,
    pub error_rate: f64,
}
