// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport traits for messaging platform integrations.

use async_trait::async_trait;

use crate::error::AttacheError;
use crate::types::Platform;

/// Narrow outbound seam handed to workers and the report pipeline.
///
/// Workers never hold the transport adapter itself; they hold this trait
/// object, so the adapter remains the sole owner of the underlying socket
/// and the adapter -> worker -> adapter cycle is broken at a data boundary.
#[async_trait]
pub trait TextSender: Send + Sync {
    /// Sends plain text to the given address on this transport.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError>;
}

/// Full transport adapter: a [`TextSender`] plus connection lifecycle.
#[async_trait]
pub trait TransportAdapter: TextSender {
    /// Which platform this adapter speaks.
    fn platform(&self) -> Platform;

    /// Ends the platform session. Stored credentials become invalid and the
    /// next connect requires re-pairing.
    async fn logout(&self) -> Result<(), AttacheError>;
}
