// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session tracking by silence.
//!
//! Every inbound or outbound message touches the contact's session: an
//! `active` row is opened if none exists and the silence deadline resets.
//! When the deadline passes (or the model emits the end-of-session sentinel)
//! the session completes and a report task is enqueued. The tracker never
//! calls the LLM.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attache_core::AttacheError;
use attache_storage::database::now_iso;
use attache_storage::queries::{conversations, report_queue};
use attache_storage::Database;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the sweeper looks for expired sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

struct TrackedSession {
    deadline: Instant,
    display_name: Option<String>,
    last_user_message_at: Option<String>,
}

/// Per-contact silence timers over the `conversations` table.
pub struct SessionTracker {
    db: Arc<Database>,
    timeout: Duration,
    tracked: Mutex<HashMap<String, TrackedSession>>,
}

impl SessionTracker {
    pub fn new(db: Arc<Database>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            db,
            timeout,
            tracked: Mutex::new(HashMap::new()),
        })
    }

    /// Resets the contact's silence deadline, opening an active session row
    /// if none exists. `inbound` marks user activity for the report row.
    pub async fn touch(
        &self,
        contact_phone: &str,
        display_name: Option<&str>,
        inbound: bool,
    ) -> Result<(), AttacheError> {
        conversations::open_if_absent(&self.db, contact_phone).await?;

        let mut tracked = self.tracked.lock().await;
        let entry = tracked
            .entry(contact_phone.to_string())
            .or_insert(TrackedSession {
                deadline: Instant::now() + self.timeout,
                display_name: None,
                last_user_message_at: None,
            });
        entry.deadline = Instant::now() + self.timeout;
        if let Some(name) = display_name {
            entry.display_name = Some(name.to_string());
        }
        if inbound {
            entry.last_user_message_at = Some(now_iso());
        }
        Ok(())
    }

    /// Completes the contact's active session immediately (end-of-session
    /// sentinel) and enqueues its report. No-op when nothing is active.
    pub async fn end_now(&self, contact_phone: &str) -> Result<(), AttacheError> {
        let removed = self.tracked.lock().await.remove(contact_phone);
        self.complete_and_enqueue(contact_phone, removed).await
    }

    async fn complete_and_enqueue(
        &self,
        contact_phone: &str,
        tracked: Option<TrackedSession>,
    ) -> Result<(), AttacheError> {
        let Some(conversation) = conversations::complete_active(&self.db, contact_phone).await?
        else {
            return Ok(());
        };
        let (display_name, last_user_at) = match tracked {
            Some(t) => (t.display_name, t.last_user_message_at),
            None => (None, None),
        };
        report_queue::enqueue(
            &self.db,
            contact_phone,
            display_name.as_deref(),
            &conversation.id,
            last_user_at.as_deref(),
        )
        .await?;
        info!(
            contact = contact_phone,
            conversation = %conversation.id,
            "session completed, report enqueued"
        );
        Ok(())
    }

    /// Sweeps expired sessions until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_expired().await {
                        warn!(error = %e, "session sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("session tracker stopping");
                    break;
                }
            }
        }
    }

    /// Completes every session whose silence deadline has passed. Exposed
    /// for tests; the background loop calls it on an interval.
    pub async fn sweep_expired(&self) -> Result<usize, AttacheError> {
        let now = Instant::now();
        let expired: Vec<(String, TrackedSession)> = {
            let mut tracked = self.tracked.lock().await;
            let keys: Vec<String> = tracked
                .iter()
                .filter(|(_, session)| session.deadline <= now)
                .map(|(phone, _)| phone.clone())
                .collect();
            keys.into_iter()
                .filter_map(|phone| tracked.remove(&phone).map(|s| (phone, s)))
                .collect()
        };

        let count = expired.len();
        for (phone, session) in expired {
            self.complete_and_enqueue(&phone, Some(session)).await?;
        }
        Ok(count)
    }
}
