// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intake filter: the first stage every inbound event passes through.
//!
//! Drops non-text, group/broadcast, and self-echo events; counts decryption
//! failures per sender and sends a canned recovery message past a threshold;
//! normalizes the sender address (owner alternate ids fold back onto the
//! canonical owner address); upserts the contact; touches the session; and
//! hands the text to the debounce buffer.
//!
//! Flushed batches pass the ack short-circuit before being enqueued.

use std::collections::HashMap;
use std::sync::Arc;

use attache_core::{
    AttacheError, Batch, InboundEvent, Platform, Priority, TextSender,
};
use attache_storage::queries::{contacts, queue};
use attache_storage::Database;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::DebounceBuffer;
use crate::identity;
use crate::session_tracker::SessionTracker;

/// Consecutive decryption failures from one sender before the canned
/// recovery message goes out.
const DECRYPT_FAILURE_THRESHOLD: u32 = 3;

const RECOVERY_MESSAGE: &str = "I had trouble reading your last messages. Could you send \
that again?";

/// Trivial acknowledgements dropped for non-owners before any queueing.
const ACK_WORDS: &[&str] = &["ok", "okay", "thanks", "lol", "yes", "no", "👍", "✅"];

/// True when a batch is a bare acknowledgement not worth a model call.
pub fn is_trivial_ack(text: &str) -> bool {
    let trimmed = text.trim();
    let stripped = trimmed.strip_suffix('.').unwrap_or(trimmed);
    let lowered = stripped.to_lowercase();
    ACK_WORDS.contains(&lowered.as_str())
}

/// Collapses a phone-form address to digits; leaves pure chat ids alone.
pub fn normalize_address(address: &str) -> String {
    let digits: String = address
        .split('@')
        .next()
        .unwrap_or(address)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        address.to_string()
    } else {
        digits
    }
}

fn is_group_or_broadcast(address: &str) -> bool {
    address.ends_with("@g.us")
        || address.contains("@broadcast")
        || address.contains("@newsletter")
        || address == "status"
}

/// First pipeline stage: filter, normalize, upsert, debounce.
pub struct IntakeService {
    db: Arc<Database>,
    debounce: Arc<DebounceBuffer>,
    sessions: Arc<SessionTracker>,
    owner_address: Option<String>,
    alternate_owner_ids: Vec<String>,
    decrypt_failures: Mutex<HashMap<String, u32>>,
    senders: HashMap<Platform, Arc<dyn TextSender>>,
}

impl IntakeService {
    pub fn new(
        db: Arc<Database>,
        debounce: Arc<DebounceBuffer>,
        sessions: Arc<SessionTracker>,
        owner_address: Option<String>,
        alternate_owner_ids: Vec<String>,
        senders: HashMap<Platform, Arc<dyn TextSender>>,
    ) -> Self {
        Self {
            db,
            debounce,
            sessions,
            owner_address,
            alternate_owner_ids,
            decrypt_failures: Mutex::new(HashMap::new()),
            senders,
        }
    }

    fn is_owner(&self, normalized: &str) -> bool {
        self.owner_address.as_deref() == Some(normalized)
    }

    /// Maps any known owner alternate id back to the canonical address.
    fn resolve_owner_alias(&self, raw: &str, normalized: &str) -> String {
        if let Some(owner) = &self.owner_address {
            if self.alternate_owner_ids.iter().any(|alias| {
                alias == raw || normalize_address(alias) == normalized
            }) {
                return owner.clone();
            }
        }
        normalized.to_string()
    }

    /// Runs one inbound event through the filter chain.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<(), AttacheError> {
        if is_group_or_broadcast(&event.address) {
            debug!(address = %event.address, "dropping group/broadcast event");
            return Ok(());
        }
        if event.from_self {
            debug!(address = %event.address, "dropping self-echo");
            return Ok(());
        }

        let normalized = self.resolve_owner_alias(&event.address, &normalize_address(&event.address));

        if event.undecryptable {
            return self.handle_undecryptable(&normalized, event.platform).await;
        }

        let Some(text) = event.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
        else {
            debug!(address = %normalized, kind = %event.media_kind, "dropping event without text");
            return Ok(());
        };

        // A readable message resets the sender's decryption failure streak.
        self.decrypt_failures.lock().await.remove(&normalized);

        let display_name = identity::derive_display_name(event.push_name.as_deref());
        contacts::upsert_on_inbound(
            &self.db,
            &normalized,
            display_name.as_deref(),
            &event.platform.to_string(),
        )
        .await?;

        self.sessions
            .touch(&normalized, display_name.as_deref(), true)
            .await?;

        self.debounce.push(&normalized, text.to_string()).await;
        Ok(())
    }

    async fn handle_undecryptable(
        &self,
        sender: &str,
        platform: Platform,
    ) -> Result<(), AttacheError> {
        let send_recovery = {
            let mut failures = self.decrypt_failures.lock().await;
            let count = failures.entry(sender.to_string()).or_insert(0);
            *count += 1;
            if *count >= DECRYPT_FAILURE_THRESHOLD {
                failures.remove(sender);
                true
            } else {
                false
            }
        };

        if send_recovery {
            warn!(sender, "decryption failure threshold reached, sending recovery note");
            if let Some(transport) = self.senders.get(&platform) {
                transport.send_text(sender, RECOVERY_MESSAGE).await?;
            }
        }
        Ok(())
    }

    /// Consumes flushed batches: ack short-circuit, then durable enqueue.
    ///
    /// Owner batches are enqueued HIGH and bypass the short-circuit; everyone
    /// else's go NORMAL.
    pub async fn run_batch_submitter(
        &self,
        mut batches: mpsc::Receiver<Batch>,
        cancel: CancellationToken,
    ) {
        loop {
            let batch = tokio::select! {
                batch = batches.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            };
            if let Err(e) = self.submit_batch(&batch).await {
                warn!(sender = %batch.sender, error = %e, "failed to enqueue batch");
            }
        }
        info!("batch submitter stopped");
    }

    /// Short-circuit plus enqueue for a single flushed batch.
    pub async fn submit_batch(&self, batch: &Batch) -> Result<Option<i64>, AttacheError> {
        let is_owner = self.is_owner(&batch.sender);
        if !is_owner && is_trivial_ack(&batch.joined()) {
            debug!(sender = %batch.sender, "short-circuiting trivial ack");
            return Ok(None);
        }
        let priority = if is_owner {
            Priority::High
        } else {
            Priority::Normal
        };
        let id = queue::enqueue(&self.db, &batch.sender, &batch.texts, priority).await?;
        debug!(sender = %batch.sender, queue_id = id, ?priority, "batch enqueued");
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attache_core::MediaKind;
    use std::time::Duration;
    use tempfile::tempdir;

    struct CaptureSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl CaptureSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextSender for CaptureSender {
        async fn send_text(&self, address: &str, text: &str) -> Result<(), AttacheError> {
            self.sent
                .lock()
                .await
                .push((address.to_string(), text.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (
        IntakeService,
        mpsc::Receiver<Batch>,
        Arc<CaptureSender>,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("intake.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        let (debounce, rx) = DebounceBuffer::new(Duration::from_millis(30), 20);
        let sessions = SessionTracker::new(db.clone(), Duration::from_secs(1200));
        let capture = CaptureSender::new();
        let mut senders: HashMap<Platform, Arc<dyn TextSender>> = HashMap::new();
        senders.insert(Platform::Whatsapp, capture.clone());
        let intake = IntakeService::new(
            db,
            debounce,
            sessions,
            Some("15550009999".to_string()),
            vec!["15550009999:17@device".to_string()],
            senders,
        );
        (intake, rx, capture, dir)
    }

    fn event(address: &str, text: &str) -> InboundEvent {
        InboundEvent {
            address: address.to_string(),
            push_name: Some("Alice".to_string()),
            text: Some(text.to_string()),
            media_kind: MediaKind::Text,
            platform: Platform::Whatsapp,
            from_self: false,
            undecryptable: false,
        }
    }

    #[test]
    fn ack_detection_matches_the_fixed_set() {
        for ack in ["ok", "OK", "Okay.", "thanks", "LOL", "yes", "No.", "👍", "✅"] {
            assert!(is_trivial_ack(ack), "{ack} should short-circuit");
        }
        for real in ["ok, but one question", "yes we can meet at 5", "thanks a lot!"] {
            assert!(!is_trivial_ack(real), "{real} should pass through");
        }
    }

    #[test]
    fn address_normalization_strips_to_digits() {
        assert_eq!(normalize_address("15551234567@s.whatsapp.net"), "15551234567");
        assert_eq!(normalize_address("+1 (555) 123-4567"), "15551234567");
        assert_eq!(normalize_address("987654"), "987654");
        // Non-numeric chat ids pass through untouched.
        assert_eq!(normalize_address("someuser"), "someuser");
    }

    #[tokio::test]
    async fn group_broadcast_and_self_events_are_dropped() {
        let (intake, _rx, _capture, _dir) = setup().await;

        intake
            .handle_event(event("12345-67890@g.us", "group chatter"))
            .await
            .unwrap();
        intake
            .handle_event(event("status@broadcast", "story"))
            .await
            .unwrap();
        let mut own = event("15551234567@s.whatsapp.net", "me to me");
        own.from_self = true;
        intake.handle_event(own).await.unwrap();

        assert_eq!(contacts::count(&intake.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn textless_events_are_dropped() {
        let (intake, _rx, _capture, _dir) = setup().await;
        let mut media = event("15551234567@s.whatsapp.net", "");
        media.text = None;
        media.media_kind = MediaKind::Image;
        intake.handle_event(media).await.unwrap();
        assert_eq!(contacts::count(&intake.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn accepted_event_upserts_contact_and_buffers_text() {
        let (intake, mut rx, _capture, _dir) = setup().await;

        intake
            .handle_event(event("15551234567@s.whatsapp.net", "hi im Alice"))
            .await
            .unwrap();

        let contact = contacts::get(&intake.db, "15551234567")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("Alice"));
        assert!(!contact.verified);

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.sender, "15551234567");
        assert_eq!(batch.texts, vec!["hi im Alice"]);
    }

    #[tokio::test]
    async fn owner_alternate_id_folds_to_canonical_address() {
        let (intake, mut rx, _capture, _dir) = setup().await;

        intake
            .handle_event(event("15550009999:17@device", "note to self"))
            .await
            .unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.sender, "15550009999");
    }

    #[tokio::test]
    async fn third_consecutive_decrypt_failure_sends_recovery() {
        let (intake, _rx, capture, _dir) = setup().await;

        let mut broken = event("15551234567@s.whatsapp.net", "");
        broken.text = None;
        broken.undecryptable = true;

        intake.handle_event(broken.clone()).await.unwrap();
        intake.handle_event(broken.clone()).await.unwrap();
        assert!(capture.sent.lock().await.is_empty());

        intake.handle_event(broken.clone()).await.unwrap();
        let sent = capture.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "15551234567");
        assert!(sent[0].1.contains("trouble reading"));
        drop(sent);

        // Counter reset: two more failures stay quiet.
        intake.handle_event(broken.clone()).await.unwrap();
        intake.handle_event(broken).await.unwrap();
        assert_eq!(capture.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn readable_message_resets_decrypt_counter() {
        let (intake, _rx, capture, _dir) = setup().await;

        let mut broken = event("15551234567@s.whatsapp.net", "");
        broken.text = None;
        broken.undecryptable = true;

        intake.handle_event(broken.clone()).await.unwrap();
        intake.handle_event(broken.clone()).await.unwrap();
        intake
            .handle_event(event("15551234567@s.whatsapp.net", "can you read me now?"))
            .await
            .unwrap();
        intake.handle_event(broken.clone()).await.unwrap();
        intake.handle_event(broken).await.unwrap();

        assert!(capture.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn non_owner_ack_is_dropped_owner_ack_is_enqueued() {
        let (intake, _rx, _capture, _dir) = setup().await;

        let contact_ack = Batch {
            sender: "15551234567".to_string(),
            texts: vec!["ok".to_string()],
        };
        assert!(intake.submit_batch(&contact_ack).await.unwrap().is_none());
        assert_eq!(queue::depth(&intake.db).await.unwrap(), 0);

        let owner_ack = Batch {
            sender: "15550009999".to_string(),
            texts: vec!["ok".to_string()],
        };
        let id = intake.submit_batch(&owner_ack).await.unwrap().unwrap();
        let item = queue::get(&intake.db, id).await.unwrap().unwrap();
        assert_eq!(item.priority, Priority::High.as_i64());
    }

    #[tokio::test]
    async fn normal_batch_enqueues_at_normal_priority() {
        let (intake, _rx, _capture, _dir) = setup().await;

        let batch = Batch {
            sender: "15551234567".to_string(),
            texts: vec!["hi".to_string(), "are you open?".to_string()],
        };
        let id = intake.submit_batch(&batch).await.unwrap().unwrap();
        let item = queue::get(&intake.db, id).await.unwrap().unwrap();
        assert_eq!(item.priority, Priority::Normal.as_i64());
        assert_eq!(item.texts().unwrap().len(), 2);
    }
}
