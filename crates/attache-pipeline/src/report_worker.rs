// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report worker: turns completed sessions into owner summaries.
//!
//! Leases one pending report at a time, slices the session's log window,
//! stores the conversation analysis, generates the summary, and delivers it
//! to the owner best-effort. Key exhaustion defers the lease until the
//! earliest cooldown expires; other failures retry with backoff.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use attache_core::{AttacheError, ChatTurn, Notifier, Role};
use attache_llm::{LlmGateway, ReportMeta};
use attache_storage::database::{iso_after, now_iso};
use attache_storage::models::ReportItem;
use attache_storage::queries::{conversations, messages, report_queue};
use attache_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sleep between lease attempts when no report is pending.
const IDLE_POLL: Duration = Duration::from_secs(5);

/// Deferral when the pool is permanently dead.
const DEAD_POOL_DEFER: Duration = Duration::from_secs(300);

/// Single background consumer of the report queue.
pub struct ReportWorker {
    db: Arc<Database>,
    gateway: Arc<LlmGateway>,
    notifier: Arc<dyn Notifier>,
    max_retries: i64,
}

impl ReportWorker {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<LlmGateway>,
        notifier: Arc<dyn Notifier>,
        max_retries: i64,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
            max_retries,
        }
    }

    /// Drains pending reports until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match report_queue::lease(&self.db).await {
                Ok(Some(item)) => {
                    if let Err(e) = self.settle(item).await {
                        warn!(error = %e, "report settlement failed");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "report lease failed");
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }
        info!("report worker stopped");
    }

    /// Leases and settles at most one pending report. Returns whether a
    /// report was leased. Used by tests and by callers that want to drain
    /// synchronously.
    pub async fn drain_once(&self) -> Result<bool, AttacheError> {
        match report_queue::lease(&self.db).await? {
            Some(item) => {
                self.settle(item).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn settle(&self, item: ReportItem) -> Result<(), AttacheError> {
        match self.process(&item).await {
            Ok(()) => report_queue::complete(&self.db, item.id).await,
            Err(e) if e.is_capacity_exhaustion() => {
                let visible_at = match self.gateway.earliest_available().await {
                    Some(wait) if wait > Duration::ZERO => iso_after(wait),
                    Some(_) => iso_after(Duration::from_secs(1)),
                    None => iso_after(DEAD_POOL_DEFER),
                };
                warn!(report = item.id, until = %visible_at, "key pool exhausted, deferring report");
                report_queue::release(&self.db, item.id, &visible_at).await
            }
            Err(e) => {
                warn!(report = item.id, error = %e, "report generation failed");
                report_queue::fail(&self.db, item.id, &e.to_string(), self.max_retries).await
            }
        }
    }

    /// Generates and delivers one report. Exposed for tests; the background
    /// loop drives it through `settle`.
    pub async fn process(&self, item: &ReportItem) -> Result<(), AttacheError> {
        let Some(conversation) = conversations::get(&self.db, &item.conversation_id).await?
        else {
            debug!(report = item.id, "conversation vanished, nothing to report");
            return Ok(());
        };

        let window_end = conversation.ended_at.clone().unwrap_or_else(now_iso);
        let logs = messages::between(
            &self.db,
            &item.contact_phone,
            &conversation.started_at,
            &window_end,
        )
        .await?;
        if logs.is_empty() {
            debug!(report = item.id, "empty session, skipping report");
            return Ok(());
        }

        let turns: Vec<ChatTurn> = logs
            .iter()
            .filter_map(|log| {
                Role::from_str(&log.role).ok().map(|role| ChatTurn {
                    role,
                    content: log.content.clone(),
                })
            })
            .collect();

        // Analysis first: the urgency tag feeds the report prompt and is
        // stored on the conversation row for the admin API.
        let analysis = self.gateway.analyze_conversation(&turns).await?;
        conversations::set_analysis(
            &self.db,
            &conversation.id,
            analysis.urgency,
            &analysis.summary,
        )
        .await?;

        let contact_name = item
            .display_name
            .clone()
            .unwrap_or_else(|| item.contact_phone.clone());
        let meta = ReportMeta {
            started_at: conversation.started_at.clone(),
            ended_at: conversation.ended_at.clone(),
            urgency: Some(analysis.urgency),
        };
        let report = self.gateway.generate_report(&turns, &contact_name, &meta).await?;

        // Delivery is best-effort: a notifier outage must not burn retries
        // on an already generated report.
        let note = format!("Session report — {contact_name}:\n{report}");
        if let Err(e) = self.notifier.notify_owner(&note).await {
            warn!(report = item.id, error = %e, "report delivery failed");
        } else {
            info!(report = item.id, contact = %item.contact_phone, "report delivered");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attache_core::{ModelClient, ModelReply, ModelRequest, ModelResponse};
    use attache_llm::GatewayConfig;
    use attache_storage::queries::contacts;
    use std::collections::VecDeque;
    use tempfile::tempdir;
    use tokio::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ModelReply, AttacheError>>>,
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn complete(
            &self,
            _api_key: &str,
            _request: &ModelRequest,
        ) -> Result<ModelResponse, AttacheError> {
            let reply = self
                .replies
                .lock()
                .await
                .pop_front()
                .unwrap_or(Ok(ModelReply::Text("default".into())));
            reply.map(|reply| ModelResponse {
                reply,
                model: "test".into(),
            })
        }
    }

    struct CaptureNotifier {
        notes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for CaptureNotifier {
        async fn notify_owner(&self, text: &str) -> Result<(), AttacheError> {
            self.notes.lock().await.push(text.to_string());
            Ok(())
        }
    }

    struct Fixture {
        worker: ReportWorker,
        db: Arc<Database>,
        notifier: Arc<CaptureNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(replies: Vec<Result<ModelReply, AttacheError>>) -> Fixture {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reports.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        let gateway = LlmGateway::new(
            GatewayConfig {
                model: "test".into(),
                min_spacing: Duration::from_millis(1),
                retry_delay: Duration::from_millis(1),
                max_attempts: 5,
                request_timeout: Duration::from_secs(5),
                max_tokens: 256,
            },
            vec!["k1".into()],
            Arc::new(ScriptedModel {
                replies: Mutex::new(replies.into()),
            }),
        );
        let notifier = Arc::new(CaptureNotifier {
            notes: Mutex::new(Vec::new()),
        });
        let worker = ReportWorker::new(db.clone(), gateway, notifier.clone(), 3);
        Fixture {
            worker,
            db,
            notifier,
            _dir: dir,
        }
    }

    /// A completed conversation with two logged turns and its report item.
    async fn seed_session(db: &Database) -> ReportItem {
        contacts::upsert_on_inbound(db, "155", Some("Alice"), "whatsapp")
            .await
            .unwrap();
        conversations::open_if_absent(db, "155").await.unwrap();
        messages::append(db, "155", "user", "when do you open?", "text", "whatsapp")
            .await
            .unwrap();
        messages::append(db, "155", "agent", "at nine", "text", "whatsapp")
            .await
            .unwrap();
        let conversation = conversations::complete_active(db, "155").await.unwrap().unwrap();
        report_queue::enqueue(db, "155", Some("Alice"), &conversation.id, None)
            .await
            .unwrap();
        report_queue::lease(db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn report_is_generated_analyzed_and_delivered() {
        let f = fixture(vec![
            // Analysis call, then report call.
            Ok(ModelReply::Text(
                r#"{"urgency": 6, "status": "resolved", "summary": "opening hours"}"#.into(),
            )),
            Ok(ModelReply::Text("Alice asked about opening hours.".into())),
        ])
        .await;

        let item = seed_session(&f.db).await;
        f.worker.settle(item.clone()).await.unwrap();

        let notes = f.notifier.notes.lock().await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("Alice"));
        assert!(notes[0].contains("opening hours"));
        drop(notes);

        // Analysis persisted on the conversation row.
        let conversation = conversations::get(&f.db, &item.conversation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.urgency, Some(6));

        assert_eq!(report_queue::pending_count(&f.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn key_exhaustion_defers_without_burning_a_retry() {
        let f = fixture(vec![Err(AttacheError::RateLimited {
            retry_after: Duration::from_secs(30),
        })])
        .await;

        let item = seed_session(&f.db).await;
        f.worker.settle(item.clone()).await.unwrap();

        // Still pending, hidden in the future, retry count untouched.
        assert_eq!(report_queue::pending_count(&f.db).await.unwrap(), 1);
        assert!(report_queue::lease(&f.db).await.unwrap().is_none());
        assert!(f.notifier.notes.lock().await.is_empty());
    }

    #[tokio::test]
    async fn hard_failure_burns_a_retry() {
        let f = fixture(vec![
            Err(AttacheError::Transport {
                message: "boom".into(),
                source: None,
            }),
        ])
        .await;

        let item = seed_session(&f.db).await;
        f.worker.settle(item).await.unwrap();

        // Re-queued with a backoff and one attempt recorded.
        assert_eq!(report_queue::pending_count(&f.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn vanished_conversation_completes_quietly() {
        let f = fixture(vec![]).await;

        report_queue::enqueue(&f.db, "155", None, "no-such-conversation", None)
            .await
            .unwrap();
        let item = report_queue::lease(&f.db).await.unwrap().unwrap();
        f.worker.settle(item).await.unwrap();

        assert_eq!(report_queue::pending_count(&f.db).await.unwrap(), 0);
        assert!(f.notifier.notes.lock().await.is_empty());
    }
}
