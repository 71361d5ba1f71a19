// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capture transport: records outbound text instead of sending it.

use std::sync::Arc;

use async_trait::async_trait;
use attache_core::{AttacheError, TextSender};
use tokio::sync::Mutex;

/// Records every `send_text` for later assertions.
pub struct CaptureTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl CaptureTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Everything sent so far as (address, text) pairs, in order.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Texts sent to one address, in order.
    pub async fn sent_to(&self, address: &str) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(to, _)| to == address)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl TextSender for CaptureTransport {
    async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError> {
        self.sent
            .lock()
            .await
            .push((address.to_string(), text.to_string()));
        Ok(())
    }
}
