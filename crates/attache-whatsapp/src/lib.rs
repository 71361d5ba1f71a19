// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp-style transport shell.
//!
//! Owns the connection lifecycle over an abstract [`WireSocket`]: exponential
//! reconnect backoff capped at 30 s with a bounded attempt budget (reset when
//! a session proves stable), session-key persistence through the credential
//! store, and fatal lifecycle codes that wipe credentials and terminate the
//! process for supervisor restart.

pub mod socket;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use attache_core::{
    AttacheError, InboundEvent, Platform, TextSender, TransportAdapter, TransportState,
    TransportStatus,
};
use attache_storage::queries::credentials;
use attache_storage::Database;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use socket::{DisconnectReason, WireEvent, WireSocket};

/// Credential store collection for this transport's session keys.
pub const CRED_COLLECTION: &str = "wa-session";

/// Entry holding the primary session blob handed to `connect`.
const PRIMARY_CRED_KEY: &str = "wa-session:creds";

/// Reconnect attempts before giving up.
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Backoff cap between reconnect attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A session that lasted this long counts as stable and resets the
/// reconnect attempt budget.
const STABLE_SESSION: Duration = Duration::from_secs(60);

/// The transport shell: lifecycle engine plus outbound sender.
pub struct WhatsAppTransport {
    socket: Arc<dyn WireSocket>,
    db: Arc<Database>,
    events_tx: mpsc::Sender<InboundEvent>,
    status: Arc<RwLock<TransportStatus>>,
}

impl WhatsAppTransport {
    pub fn new(
        socket: Arc<dyn WireSocket>,
        db: Arc<Database>,
        events_tx: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            socket,
            db,
            events_tx,
            status: Arc::new(RwLock::new(TransportStatus::default())),
        }
    }

    /// Shared status snapshot for the admin API.
    pub fn status_handle(&self) -> Arc<RwLock<TransportStatus>> {
        self.status.clone()
    }

    async fn set_status(&self, state: TransportState, qr: Option<String>) {
        let mut status = self.status.write().await;
        status.state = state;
        status.qr = qr;
    }

    /// Runs the connect/consume/reconnect loop until cancellation, a fatal
    /// lifecycle code (`SessionConflict`), or the attempt budget runs out.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AttacheError> {
        let mut attempts: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                self.set_status(TransportState::Disconnected, None).await;
                return Ok(());
            }

            self.set_status(TransportState::Connecting, None).await;
            let stored = credentials::read(&self.db, PRIMARY_CRED_KEY).await?;
            let session_result = match self.socket.connect(stored).await {
                Ok(events) => {
                    let started = Instant::now();
                    let outcome = self.consume_session(events, &cancel).await?;
                    if started.elapsed() > STABLE_SESSION {
                        debug!("session was stable, resetting reconnect budget");
                        attempts = 0;
                    }
                    outcome
                }
                Err(e) => {
                    warn!(error = %e, "socket connect failed");
                    SessionOutcome::Dropped
                }
            };

            self.set_status(TransportState::Disconnected, None).await;
            match session_result {
                SessionOutcome::Cancelled => return Ok(()),
                SessionOutcome::Fatal(reason) => {
                    error!(%reason, "fatal transport lifecycle, wiping session");
                    credentials::wipe_collection(&self.db, CRED_COLLECTION).await?;
                    return Err(AttacheError::SessionConflict(reason.to_string()));
                }
                SessionOutcome::Dropped => {
                    attempts += 1;
                    if attempts > MAX_RECONNECT_ATTEMPTS {
                        return Err(AttacheError::Transport {
                            message: format!(
                                "gave up after {MAX_RECONNECT_ATTEMPTS} reconnect attempts"
                            ),
                            source: None,
                        });
                    }
                    let backoff = reconnect_backoff(attempts);
                    info!(attempt = attempts, backoff_secs = backoff.as_secs(), "reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    /// Consumes one connected session's event stream.
    async fn consume_session(
        &self,
        mut events: mpsc::Receiver<WireEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, AttacheError> {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = cancel.cancelled() => return Ok(SessionOutcome::Cancelled),
            };
            match event {
                Some(WireEvent::Qr(payload)) => {
                    info!("pairing required, QR surfaced to admin UI");
                    self.set_status(TransportState::QrPending, Some(payload)).await;
                }
                Some(WireEvent::Connected) => {
                    info!("transport connected");
                    self.set_status(TransportState::Connected, None).await;
                }
                Some(WireEvent::Message(inbound)) => {
                    if self.events_tx.send(inbound).await.is_err() {
                        warn!("intake channel closed, stopping transport");
                        return Ok(SessionOutcome::Cancelled);
                    }
                }
                Some(WireEvent::CredentialsUpdate { id, blob }) => {
                    let key = format!("{CRED_COLLECTION}:{id}");
                    credentials::write(&self.db, &key, &blob).await?;
                    debug!(key = %key, "session credentials persisted");
                }
                Some(WireEvent::Disconnected(reason)) if reason.is_fatal() => {
                    return Ok(SessionOutcome::Fatal(reason));
                }
                Some(WireEvent::Disconnected(reason)) => {
                    warn!(%reason, "transport disconnected");
                    return Ok(SessionOutcome::Dropped);
                }
                // Stream ended without an explicit disconnect.
                None => return Ok(SessionOutcome::Dropped),
            }
        }
    }

    /// Wipes the stored session (admin disconnect, fatal lifecycle).
    pub async fn wipe_credentials(&self) -> Result<(), AttacheError> {
        credentials::wipe_collection(&self.db, CRED_COLLECTION).await?;
        Ok(())
    }
}

enum SessionOutcome {
    Cancelled,
    Dropped,
    Fatal(DisconnectReason),
}

/// Exponential backoff: 1s, 2s, 4s, ... capped at 30s.
fn reconnect_backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5);
    MAX_BACKOFF.min(Duration::from_secs(1 << exp))
}

#[async_trait]
impl TextSender for WhatsAppTransport {
    async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError> {
        self.socket.send_text(address, text).await
    }
}

#[async_trait]
impl TransportAdapter for WhatsAppTransport {
    fn platform(&self) -> Platform {
        Platform::Whatsapp
    }

    async fn logout(&self) -> Result<(), AttacheError> {
        self.socket.logout().await?;
        self.wipe_credentials().await?;
        self.set_status(TransportState::Disconnected, None).await;
        Ok(())
    }
}
