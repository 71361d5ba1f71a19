// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The LLM gateway: one global FIFO of model operations.
//!
//! A single consumer task drains the queue, so model calls never interleave
//! and consecutive calls are separated by at least the configured spacing.
//! Each call rotates through the key pool: rate-limited keys cool down,
//! overloaded responses retry the same key after a longer pause, rejected
//! credentials die, and timeouts rotate. When no key is usable the operation
//! fails with `AllKeysExhausted` and callers defer work until the earliest
//! cooldown expires.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use attache_config::model::LlmConfig;
use attache_core::{
    AttacheError, ChatTurn, ConversationAnalysis, ModelClient, ModelReply, ModelRequest,
    ProfileUpdate,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::keypool::KeyPool;
use crate::parse;
use crate::prompt::{self, ReplyPrompt, ReportMeta};

/// Gateway tuning, derived from [`LlmConfig`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub model: String,
    pub min_spacing: Duration,
    pub retry_delay: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub max_tokens: u32,
}

impl GatewayConfig {
    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            min_spacing: Duration::from_millis(config.min_spacing_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_attempts: config.max_attempts,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_tokens: config.max_tokens,
        }
    }
}

struct Job {
    request: ModelRequest,
    reply: oneshot::Sender<Result<ModelReply, AttacheError>>,
}

/// Serialized, key-rotated front door for every model call in the process.
pub struct LlmGateway {
    tx: mpsc::Sender<Job>,
    pool: Arc<Mutex<KeyPool>>,
    pending: Arc<AtomicUsize>,
    config: GatewayConfig,
}

impl LlmGateway {
    /// Creates the gateway and spawns its consumer task. The task ends when
    /// the gateway is dropped.
    pub fn new(
        config: GatewayConfig,
        keys: Vec<String>,
        client: Arc<dyn ModelClient>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Job>(64);
        let pool = Arc::new(Mutex::new(KeyPool::new(keys)));
        let pending = Arc::new(AtomicUsize::new(0));

        let consumer_pool = pool.clone();
        let consumer_config = config.clone();
        tokio::spawn(async move {
            run_consumer(rx, consumer_pool, client, consumer_config).await;
        });

        Arc::new(Self {
            tx,
            pool,
            pending,
            config,
        })
    }

    /// True when no operation is queued or in flight. The reply engine only
    /// schedules background profiling passes while the gateway is idle.
    pub fn is_idle(&self) -> bool {
        self.pending.load(Ordering::Relaxed) == 0
    }

    /// True when every key is dead or cooling down right now.
    pub async fn is_exhausted(&self) -> bool {
        self.pool.lock().await.is_exhausted(Instant::now())
    }

    /// Time until the earliest key becomes usable. Zero when one is usable
    /// now; `None` when every key is permanently dead.
    pub async fn earliest_available(&self) -> Option<Duration> {
        self.pool.lock().await.earliest_available(Instant::now())
    }

    async fn submit(&self, request: ModelRequest) -> Result<ModelReply, AttacheError> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let result = self.submit_inner(request).await;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn submit_inner(&self, request: ModelRequest) -> Result<ModelReply, AttacheError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AttacheError::Internal("LLM gateway consumer stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| AttacheError::Internal("LLM gateway dropped the operation".into()))?
    }

    /// Produce a reply (text or tool call) for one batch.
    pub async fn generate_reply(&self, reply: &ReplyPrompt) -> Result<ModelReply, AttacheError> {
        let request = prompt::build_reply_request(
            reply,
            &self.config.model,
            self.config.max_tokens,
            &chrono::Local::now(),
        );
        self.submit(request).await
    }

    /// Classify a finished conversation. Malformed output degrades to the
    /// typed fallback rather than an error.
    pub async fn analyze_conversation(
        &self,
        history: &[ChatTurn],
    ) -> Result<ConversationAnalysis, AttacheError> {
        let request = prompt::build_analysis_request(history, &self.config.model);
        match self.submit(request).await? {
            ModelReply::Text(text) => Ok(parse::parse_analysis(&text)),
            ModelReply::ToolCall { .. } => Ok(ConversationAnalysis::fallback()),
        }
    }

    /// Produce a partial contact-profile update, or `None` when the model
    /// sees nothing worth changing.
    pub async fn update_profile(
        &self,
        history: &[ChatTurn],
        current_summary: Option<&str>,
    ) -> Result<Option<ProfileUpdate>, AttacheError> {
        let request = prompt::build_profile_request(history, current_summary, &self.config.model);
        match self.submit(request).await? {
            ModelReply::Text(text) => Ok(parse::parse_profile_update(&text)),
            ModelReply::ToolCall { .. } => Ok(None),
        }
    }

    /// Produce an end-of-session summary for the owner.
    pub async fn generate_report(
        &self,
        history: &[ChatTurn],
        contact_name: &str,
        meta: &ReportMeta,
    ) -> Result<String, AttacheError> {
        let request = prompt::build_report_request(history, contact_name, meta, &self.config.model);
        match self.submit(request).await? {
            ModelReply::Text(text) => Ok(text),
            ModelReply::ToolCall { name, .. } => Err(AttacheError::Parse(format!(
                "report operation returned a tool call ({name})"
            ))),
        }
    }
}

async fn run_consumer(
    mut rx: mpsc::Receiver<Job>,
    pool: Arc<Mutex<KeyPool>>,
    client: Arc<dyn ModelClient>,
    config: GatewayConfig,
) {
    let mut last_call_done: Option<Instant> = None;
    while let Some(job) = rx.recv().await {
        let result = execute_with_rotation(
            &mut last_call_done,
            &pool,
            client.as_ref(),
            &config,
            &job.request,
        )
        .await;
        // Receiver gone means the caller gave up; nothing to do.
        let _ = job.reply.send(result);
    }
    debug!("LLM gateway consumer stopped");
}

/// One operation: rotate across the pool until a key succeeds, the pool is
/// exhausted, the attempt budget runs out, or a non-retryable error appears.
async fn execute_with_rotation(
    last_call_done: &mut Option<Instant>,
    pool: &Mutex<KeyPool>,
    client: &dyn ModelClient,
    config: &GatewayConfig,
    request: &ModelRequest,
) -> Result<ModelReply, AttacheError> {
    let mut retry_same_key: Option<usize> = None;

    for attempt in 1..=config.max_attempts {
        let key_idx = match retry_same_key.take() {
            Some(idx) => idx,
            None => {
                let mut pool = pool.lock().await;
                match pool.next_available(Instant::now()) {
                    Some(idx) => idx,
                    None => return Err(AttacheError::AllKeysExhausted),
                }
            }
        };
        let api_key = pool.lock().await.key(key_idx).to_string();

        // Global pacing: at least `min_spacing` between the end of one call
        // and the start of the next.
        if let Some(done) = *last_call_done {
            let since = done.elapsed();
            if since < config.min_spacing {
                tokio::time::sleep(config.min_spacing - since).await;
            }
        }

        let outcome = match tokio::time::timeout(
            config.request_timeout,
            client.complete(&api_key, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AttacheError::Timeout {
                duration: config.request_timeout,
            }),
        };
        *last_call_done = Some(Instant::now());

        match outcome {
            Ok(response) => {
                pool.lock().await.record_success(key_idx);
                return Ok(response.reply);
            }
            Err(AttacheError::RateLimited { retry_after }) => {
                pool.lock()
                    .await
                    .cooldown(key_idx, retry_after, Instant::now());
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(AttacheError::Overloaded) => {
                // The key is not at fault; wait out the congestion and retry
                // the same key.
                warn!(attempt, "model service overloaded, retrying same key");
                tokio::time::sleep(2 * config.min_spacing).await;
                retry_same_key = Some(key_idx);
            }
            Err(AttacheError::InvalidCredential(message)) => {
                warn!(attempt, %message, "model key rejected");
                pool.lock().await.mark_dead(key_idx);
            }
            Err(AttacheError::Timeout { duration }) => {
                warn!(attempt, ?duration, "model call timed out, rotating");
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(other) => return Err(other),
        }
    }

    Err(AttacheError::AllKeysExhausted)
}
