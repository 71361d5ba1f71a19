// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Attache messaging representative.
//!
//! Provides the error type, shared domain types, and the adapter traits
//! (transport, model client, notifier) implemented across the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::AttacheError;
pub use traits::{
    ModelClient, ModelMessage, ModelRequest, ModelResponse, Notifier, TextSender,
    TransportAdapter,
};
pub use types::{
    Batch, ChatTurn, ConversationAnalysis, InboundEvent, LifecycleEvent, MediaKind,
    ModelReply, Platform, Priority, ProfileUpdate, Role, RuntimeStats, TransportState,
    TransportStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_cover_the_pipeline() {
        let _config = AttacheError::Config("test".into());
        let _storage = AttacheError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _transport = AttacheError::Transport {
            message: "test".into(),
            source: None,
        };
        let _conflict = AttacheError::SessionConflict("replaced".into());
        let _rate = AttacheError::RateLimited {
            retry_after: std::time::Duration::from_secs(60),
        };
        let _over = AttacheError::Overloaded;
        let _cred = AttacheError::InvalidCredential("key-2".into());
        let _exhausted = AttacheError::AllKeysExhausted;
        let _tool = AttacheError::Tool {
            name: "search_web".into(),
            message: "test".into(),
        };
        let _parse = AttacheError::Parse("test".into());
        let _timeout = AttacheError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _decrypt = AttacheError::Decryption {
            sender: "155".into(),
        };
        let _internal = AttacheError::Internal("test".into());
    }

    #[test]
    fn transport_status_serializes_without_empty_qr() {
        let status = TransportStatus {
            state: TransportState::Connected,
            qr: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("connected"));
        assert!(!json.contains("qr"));
    }
}
