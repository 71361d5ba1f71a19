// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram transport adapter.
//!
//! Long-polls the Bot API via teloxide, filters to DMs, and maps messages to
//! the uniform inbound event. Also serves as the second delivery channel for
//! owner notifications.

pub mod handler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use attache_config::model::TelegramConfig;
use attache_core::{
    AttacheError, InboundEvent, Platform, TextSender, TransportAdapter,
};
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Telegram transport over teloxide long polling.
pub struct TelegramTransport {
    bot: Bot,
    connected: Arc<AtomicBool>,
    events_tx: mpsc::Sender<InboundEvent>,
}

impl TelegramTransport {
    /// Creates the transport. Requires `config.bot_token`.
    pub fn new(
        config: &TelegramConfig,
        events_tx: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, AttacheError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            AttacheError::Config("telegram.bot_token is required for the Telegram transport".into())
        })?;
        if token.is_empty() {
            return Err(AttacheError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(token),
            connected: Arc::new(AtomicBool::new(false)),
            events_tx,
        })
    }

    /// Whether the dispatcher is currently polling (for `/api/status`).
    pub fn connected_handle(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Starts the long-polling dispatcher in the background.
    pub fn start(&self) {
        let bot = self.bot.clone();
        let tx = self.events_tx.clone();
        let connected = self.connected.clone();

        info!("starting Telegram long polling");
        connected.store(true, Ordering::Relaxed);

        tokio::spawn(async move {
            let handler = Update::filter_message().endpoint(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    if !handler::is_dm(&msg) {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-DM message");
                        return respond(());
                    }
                    let event = handler::to_inbound_event(&msg);
                    if tx.send(event).await.is_err() {
                        warn!("intake channel closed, dropping Telegram message");
                    }
                    respond(())
                }
            });

            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {}) // Silently ignore non-message updates
                .build()
                .dispatch()
                .await;

            connected.store(false, Ordering::Relaxed);
            warn!("Telegram dispatcher stopped");
        });
    }
}

#[async_trait]
impl TextSender for TelegramTransport {
    async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError> {
        let chat_id = address
            .parse::<i64>()
            .map(ChatId)
            .map_err(|e| AttacheError::Transport {
                message: format!("invalid Telegram chat id '{address}': {e}"),
                source: None,
            })?;
        self.bot
            .send_message(Recipient::Id(chat_id), text)
            .await
            .map_err(|e| AttacheError::Transport {
                message: format!("failed to send Telegram message: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(())
    }
}

#[async_trait]
impl TransportAdapter for TelegramTransport {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn logout(&self) -> Result<(), AttacheError> {
        self.bot.log_out().await.map_err(|e| AttacheError::Transport {
            message: format!("Telegram logout failed: {e}"),
            source: Some(Box::new(e)),
        })?;
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(|t| t.to_string()),
            owner_chat_id: Some(987654),
        }
    }

    #[tokio::test]
    async fn new_requires_a_token() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(TelegramTransport::new(&config(None), tx).is_err());
    }

    #[tokio::test]
    async fn new_rejects_an_empty_token() {
        let (tx, _rx) = mpsc::channel(1);
        assert!(TelegramTransport::new(&config(Some("")), tx).is_err());
    }

    #[tokio::test]
    async fn new_accepts_a_plausible_token() {
        let (tx, _rx) = mpsc::channel(1);
        let transport = TelegramTransport::new(
            &config(Some("123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11")),
            tx,
        )
        .unwrap();
        assert_eq!(transport.platform(), Platform::Telegram);
        assert!(!transport.connected_handle().load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn send_rejects_non_numeric_addresses() {
        let (tx, _rx) = mpsc::channel(1);
        let transport =
            TelegramTransport::new(&config(Some("123456:token")), tx).unwrap();
        let err = transport.send_text("not-a-chat-id", "hi").await.unwrap_err();
        assert!(matches!(err, AttacheError::Transport { .. }));
    }
}
