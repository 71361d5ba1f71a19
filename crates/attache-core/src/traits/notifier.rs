// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner notification seam used by the report worker.

use async_trait::async_trait;

use crate::error::AttacheError;

/// Delivers out-of-band messages to the owner (session reports, gateway
/// error notes). Delivery is best-effort; implementations should try every
/// configured channel and succeed if any accepts the message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_owner(&self, text: &str) -> Result<(), AttacheError>;
}
