// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner notification over every configured transport.

use std::sync::Arc;

use async_trait::async_trait;
use attache_core::{AttacheError, Notifier, TextSender};
use tracing::{debug, warn};

/// One delivery target: a transport plus the owner's address on it.
pub struct NotifyTarget {
    pub sender: Arc<dyn TextSender>,
    pub address: String,
}

/// Fans a note out to the owner on every configured transport. Succeeds when
/// at least one transport accepts the message.
pub struct OwnerNotifier {
    targets: Vec<NotifyTarget>,
}

impl OwnerNotifier {
    pub fn new(targets: Vec<NotifyTarget>) -> Arc<Self> {
        Arc::new(Self { targets })
    }
}

#[async_trait]
impl Notifier for OwnerNotifier {
    async fn notify_owner(&self, text: &str) -> Result<(), AttacheError> {
        if self.targets.is_empty() {
            return Err(AttacheError::Transport {
                message: "no owner notification targets configured".into(),
                source: None,
            });
        }
        let mut delivered = false;
        for target in &self.targets {
            match target.sender.send_text(&target.address, text).await {
                Ok(()) => {
                    debug!(address = %target.address, "owner note delivered");
                    delivered = true;
                }
                Err(e) => {
                    warn!(address = %target.address, error = %e, "owner note delivery failed");
                }
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(AttacheError::Transport {
                message: "owner note failed on every transport".into(),
                source: None,
            })
        }
    }
}
