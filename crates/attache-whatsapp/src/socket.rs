// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The wire socket seam.
//!
//! The actual WhatsApp-style protocol SDK lives outside the core; this trait
//! is its byte-in/byte-out contract. The transport shell owns everything
//! above it: reconnect policy, credential persistence, and fatal lifecycle
//! handling.

use async_trait::async_trait;
use attache_core::{AttacheError, InboundEvent};
use tokio::sync::mpsc;

/// Why the socket dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Transient network loss; reconnect with backoff.
    ConnectionLost(String),
    /// Another client took over the session.
    Conflict,
    /// The account logged this device out.
    LoggedOut,
    /// Stored session state is unusable.
    CorruptedSession,
}

impl DisconnectReason {
    /// Fatal reasons invalidate the stored session: credentials are wiped
    /// and the process exits for supervisor restart.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DisconnectReason::Conflict
                | DisconnectReason::LoggedOut
                | DisconnectReason::CorruptedSession
        )
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ConnectionLost(detail) => write!(f, "connection lost: {detail}"),
            DisconnectReason::Conflict => write!(f, "session conflict"),
            DisconnectReason::LoggedOut => write!(f, "logged out"),
            DisconnectReason::CorruptedSession => write!(f, "corrupted session"),
        }
    }
}

/// Events the socket surfaces while connected.
#[derive(Debug, Clone)]
pub enum WireEvent {
    /// Pairing required; payload is rendered by the admin UI.
    Qr(String),
    Connected,
    Disconnected(DisconnectReason),
    Message(InboundEvent),
    /// The protocol layer rotated session key material; persist it.
    CredentialsUpdate { id: String, blob: Vec<u8> },
}

/// Byte-in/byte-out adapter over the protocol SDK.
#[async_trait]
pub trait WireSocket: Send + Sync {
    /// Opens the socket, resuming from stored credentials when present.
    /// The returned stream ends when the socket closes.
    async fn connect(
        &self,
        stored_credentials: Option<Vec<u8>>,
    ) -> Result<mpsc::Receiver<WireEvent>, AttacheError>;

    /// Sends plain text to an address.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError>;

    /// Ends the platform session remotely.
    async fn logout(&self) -> Result<(), AttacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(DisconnectReason::Conflict.is_fatal());
        assert!(DisconnectReason::LoggedOut.is_fatal());
        assert!(DisconnectReason::CorruptedSession.is_fatal());
        assert!(!DisconnectReason::ConnectionLost("wifi".into()).is_fatal());
    }
}
