// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the intake and reply pipeline.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Messaging platform a contact or message belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Whatsapp,
    Telegram,
}

/// Kind of media carried by an inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
    Other,
}

/// Author of a message log row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// Queue priority. Lower number dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Maps a stored priority number back to the enum. Unknown values fall
    /// back to `Normal` so a corrupted row cannot wedge the lease query.
    pub fn from_i64(n: i64) -> Self {
        match n {
            0 => Priority::Critical,
            1 => Priority::High,
            3 => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// Uniform inbound event produced by every transport adapter.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Raw sender address as the transport reports it (pre-normalization).
    pub address: String,
    /// Display name pushed by the sender's client, if any.
    pub push_name: Option<String>,
    /// Message text. `None` for media-only or undecryptable events.
    pub text: Option<String>,
    pub media_kind: MediaKind,
    pub platform: Platform,
    /// Set when the event originated from our own account (echo).
    pub from_self: bool,
    /// Set when the transport failed to decrypt the payload.
    pub undecryptable: bool,
}

/// Transport connection lifecycle transitions surfaced to the runtime.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Pairing required; the payload is rendered by the admin UI.
    QrNeeded(String),
    Connected,
    Disconnected(String),
}

/// Connection state of one transport, published for the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Connecting,
    QrPending,
    Connected,
    Disconnected,
}

/// Snapshot of one transport's status for `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub state: TransportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
}

impl Default for TransportStatus {
    fn default() -> Self {
        Self {
            state: TransportState::Disconnected,
            qr: None,
        }
    }
}

/// One coalesced flush from the debounce buffer: every text one sender
/// produced inside the quiet window, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub sender: String,
    pub texts: Vec<String>,
}

impl Batch {
    /// The newline-joined form the reply pipeline hands to the model.
    pub fn joined(&self) -> String {
        self.texts.join("\n")
    }
}

/// A single turn of conversation history handed to the LLM gateway.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// What the model produced for one `generate_reply` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
}

/// Typed result of `analyze_conversation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub urgency: i64,
    pub status: String,
    pub summary: String,
}

impl ConversationAnalysis {
    /// Fallback returned when the model's JSON cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            urgency: 5,
            status: "active".to_string(),
            summary: String::new(),
        }
    }
}

/// Partial contact-profile update produced by the profiling pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<i64>,
}

/// Process-wide pipeline gauges shared by the worker pool, the concurrency
/// controller, and the `get_system_status` tool.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    workers: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_workers(&self, n: usize) {
        self.workers.store(n, Ordering::Relaxed);
    }

    pub fn workers(&self) -> usize {
        self.workers.load(Ordering::Relaxed)
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Failure fraction over everything settled so far. Zero when idle.
    pub fn error_rate(&self) -> f64 {
        let ok = self.processed() as f64;
        let bad = self.failed() as f64;
        if ok + bad == 0.0 {
            0.0
        } else {
            bad / (ok + bad)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn priority_round_trips_through_i64() {
        for p in [
            Priority::Critical,
            Priority::High,
            Priority::Normal,
            Priority::Low,
        ] {
            assert_eq!(Priority::from_i64(p.as_i64()), p);
        }
        // Unknown numbers degrade to Normal.
        assert_eq!(Priority::from_i64(42), Priority::Normal);
    }

    #[test]
    fn priority_ordering_matches_dequeue_order() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn platform_and_role_string_forms() {
        assert_eq!(Platform::Whatsapp.to_string(), "whatsapp");
        assert_eq!(Platform::from_str("telegram").unwrap(), Platform::Telegram);
        assert_eq!(Role::Agent.to_string(), "agent");
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
    }

    #[test]
    fn batch_joins_texts_in_order() {
        let batch = Batch {
            sender: "15551234567".into(),
            texts: vec!["hi".into(), "are you open?".into()],
        };
        assert_eq!(batch.joined(), "hi\nare you open?");
    }

    #[test]
    fn analysis_fallback_shape() {
        let fb = ConversationAnalysis::fallback();
        assert_eq!(fb.urgency, 5);
        assert_eq!(fb.status, "active");
    }

    #[test]
    fn runtime_stats_error_rate() {
        let stats = RuntimeStats::new();
        assert_eq!(stats.error_rate(), 0.0);
        stats.record_processed();
        stats.record_processed();
        stats.record_processed();
        stats.record_failed();
        assert!((stats.error_rate() - 0.25).abs() < f64::EPSILON);
    }
}
