// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Full-pipeline test harness.
//!
//! Wires the real intake filter, debounce buffer, queue, reply engine,
//! session tracker, and report worker over temp SQLite, with the mock model
//! client and the capture transport at the seams. Tests drive the pipeline
//! synchronously: deliver events, pump flushed batches into the queue, then
//! process items one lease at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use attache_core::{
    types::RuntimeStats, AttacheError, Batch, InboundEvent, MediaKind, ModelReply,
    Platform, TextSender,
};
use attache_llm::{GatewayConfig, LlmGateway};
use attache_pipeline::{
    DebounceBuffer, IntakeService, OwnerNotifier, ReplyEngine, ReportWorker,
    SessionTracker,
};
use attache_pipeline::notify::NotifyTarget;
use attache_storage::queries::queue;
use attache_storage::Database;
use attache_tools::side::UnconfiguredSideApi;
use attache_tools::ToolRegistry;
use tokio::sync::{mpsc, Mutex};

use crate::mock_model::MockModelClient;
use crate::mock_transport::CaptureTransport;

/// What happened to one leased queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    /// Released back to the queue with delayed visibility.
    Deferred(String),
    /// Counted as a failed attempt.
    Failed(String),
}

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    outcomes: Vec<Result<ModelReply, AttacheError>>,
    keys: Vec<String>,
    owner: Option<String>,
    debounce: Duration,
    max_buffer: usize,
    session_timeout: Duration,
}

impl TestHarnessBuilder {
    pub fn with_mock_replies(mut self, replies: Vec<&str>) -> Self {
        self.outcomes.extend(
            replies
                .into_iter()
                .map(|text| Ok(ModelReply::Text(text.to_string()))),
        );
        self
    }

    pub fn with_outcome(mut self, outcome: Result<ModelReply, AttacheError>) -> Self {
        self.outcomes.push(outcome);
        self
    }

    pub fn with_keys(mut self, keys: Vec<&str>) -> Self {
        self.keys = keys.into_iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_owner(mut self, address: &str) -> Self {
        self.owner = Some(address.to_string());
        self
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub async fn build(self) -> Result<TestHarness, AttacheError> {
        let dir = tempfile::tempdir()
            .map_err(|e| AttacheError::Internal(format!("tempdir failed: {e}")))?;
        let db_path = dir.path().join("harness.db");
        let db = Arc::new(
            Database::open(db_path.to_str().ok_or_else(|| {
                AttacheError::Internal("non-UTF8 temp path".into())
            })?)
            .await?,
        );

        let model = MockModelClient::with_outcomes(self.outcomes);
        let gateway = LlmGateway::new(
            GatewayConfig {
                model: "test-model".to_string(),
                min_spacing: Duration::from_millis(1),
                retry_delay: Duration::from_millis(1),
                max_attempts: 50,
                request_timeout: Duration::from_secs(5),
                max_tokens: 256,
            },
            self.keys,
            model.clone(),
        );

        let mut registry = ToolRegistry::new();
        attache_tools::builtin::register_builtins(&mut registry);

        let outbound = CaptureTransport::new();
        let mut senders: HashMap<Platform, Arc<dyn TextSender>> = HashMap::new();
        senders.insert(Platform::Whatsapp, outbound.clone());
        senders.insert(Platform::Telegram, outbound.clone());

        let stats = Arc::new(RuntimeStats::new());
        let sessions = SessionTracker::new(db.clone(), self.session_timeout);
        let engine = ReplyEngine::new(
            db.clone(),
            gateway.clone(),
            Arc::new(registry),
            senders.clone(),
            sessions.clone(),
            stats.clone(),
            Arc::new(UnconfiguredSideApi),
            self.owner.clone(),
        );

        let (debounce, batches_rx) = DebounceBuffer::new(self.debounce, self.max_buffer);
        let intake = IntakeService::new(
            db.clone(),
            debounce.clone(),
            sessions.clone(),
            self.owner.clone(),
            Vec::new(),
            senders,
        );

        let notifier = OwnerNotifier::new(vec![NotifyTarget {
            sender: outbound.clone(),
            address: self.owner.clone().unwrap_or_else(|| "owner-inbox".to_string()),
        }]);
        let reports = ReportWorker::new(db.clone(), gateway.clone(), notifier, 3);

        Ok(TestHarness {
            db,
            model,
            gateway,
            outbound,
            intake,
            sessions,
            engine,
            reports,
            stats,
            debounce,
            batches: Mutex::new(batches_rx),
            debounce_window: self.debounce,
            _dir: dir,
        })
    }
}

/// The assembled pipeline under test.
pub struct TestHarness {
    pub db: Arc<Database>,
    pub model: Arc<MockModelClient>,
    pub gateway: Arc<LlmGateway>,
    pub outbound: Arc<CaptureTransport>,
    pub intake: IntakeService,
    pub sessions: Arc<SessionTracker>,
    pub engine: Arc<ReplyEngine>,
    pub reports: ReportWorker,
    pub stats: Arc<RuntimeStats>,
    pub debounce: Arc<DebounceBuffer>,
    batches: Mutex<mpsc::Receiver<Batch>>,
    debounce_window: Duration,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder {
            outcomes: Vec::new(),
            keys: vec!["test-key".to_string()],
            owner: None,
            debounce: Duration::from_millis(30),
            max_buffer: 20,
            session_timeout: Duration::from_secs(1200),
        }
    }

    /// Delivers one WhatsApp-style text event into intake.
    pub async fn deliver(
        &self,
        address: &str,
        push_name: Option<&str>,
        text: &str,
    ) -> Result<(), AttacheError> {
        self.intake
            .handle_event(InboundEvent {
                address: address.to_string(),
                push_name: push_name.map(|n| n.to_string()),
                text: Some(text.to_string()),
                media_kind: MediaKind::Text,
                platform: Platform::Whatsapp,
                from_self: false,
                undecryptable: false,
            })
            .await
    }

    /// Waits out the debounce window and submits every flushed batch to the
    /// queue. Returns how many batches were enqueued (short-circuited acks
    /// are pumped but not counted).
    pub async fn pump_batches(&self) -> Result<usize, AttacheError> {
        tokio::time::sleep(self.debounce_window + Duration::from_millis(30)).await;
        let mut enqueued = 0;
        let mut rx = self.batches.lock().await;
        while let Ok(batch) = rx.try_recv() {
            if self.intake.submit_batch(&batch).await?.is_some() {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// Leases and processes one queue item, settling it the way a worker
    /// would. Returns `None` when nothing is leasable.
    pub async fn process_next(&self, worker_id: &str) -> Result<Option<ProcessOutcome>, AttacheError> {
        let Some(item) = queue::lease(&self.db, worker_id).await? else {
            return Ok(None);
        };
        match self.engine.handle_item(&item).await {
            Ok(()) => {
                queue::complete(&self.db, item.id).await?;
                self.stats.record_processed();
                Ok(Some(ProcessOutcome::Completed))
            }
            Err(e) if e.is_capacity_exhaustion() => {
                let visible_at = self.engine.defer_visible_at().await;
                queue::release(&self.db, item.id, &visible_at).await?;
                if self.engine.is_owner(&item.sender) {
                    self.engine.send_error_note(&item.sender, &e).await;
                }
                Ok(Some(ProcessOutcome::Deferred(e.to_string())))
            }
            Err(e) => {
                queue::fail(&self.db, item.id, &e.to_string(), 3).await?;
                self.stats.record_failed();
                Ok(Some(ProcessOutcome::Failed(e.to_string())))
            }
        }
    }

    /// Processes queue items until the queue yields nothing.
    pub async fn drain_queue(&self) -> Result<Vec<ProcessOutcome>, AttacheError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next("harness-worker").await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Drains pending reports one at a time.
    pub async fn drain_reports(&self) -> Result<usize, AttacheError> {
        let mut drained = 0;
        while self.reports.drain_once().await? {
            drained += 1;
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attache_storage::queries::messages;

    #[tokio::test]
    async fn harness_round_trips_a_message() {
        let harness = TestHarness::builder()
            .with_mock_replies(vec!["Hello from the harness!"])
            .build()
            .await
            .unwrap();

        harness.deliver("155", Some("Alice"), "hi").await.unwrap();
        assert_eq!(harness.pump_batches().await.unwrap(), 1);

        // The reply batch completes; a follow-up profiling item may trail it.
        let outcomes = harness.drain_queue().await.unwrap();
        assert_eq!(outcomes[0], ProcessOutcome::Completed);

        assert_eq!(
            harness.outbound.sent_to("155").await,
            vec!["Hello from the harness!"]
        );
        let logs = messages::history(&harness.db, "155", 10).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn harnesses_are_isolated() {
        let h1 = TestHarness::builder()
            .with_mock_replies(vec!["h1"])
            .build()
            .await
            .unwrap();
        let h2 = TestHarness::builder()
            .with_mock_replies(vec!["h2"])
            .build()
            .await
            .unwrap();

        h1.deliver("155", None, "msg").await.unwrap();
        h1.pump_batches().await.unwrap();
        h1.drain_queue().await.unwrap();

        assert_eq!(h1.outbound.count().await, 1);
        assert_eq!(h2.outbound.count().await, 0);
    }
}
