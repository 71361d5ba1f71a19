// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `attache serve`: wire every subsystem and run until shutdown.
//!
//! Startup order: config -> storage (with crash recovery) -> session lock ->
//! LLM gateway -> transports -> intake/debounce -> worker pool ->
//! controller, session tracker, report worker -> admin API. Shutdown walks
//! the same order backwards: stop new leases, drain in-flight workers,
//! release the lock, flush storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use attache_admin::AdminState;
use attache_config::{load_config, validate_config, AttacheConfig};
use attache_core::{AttacheError, Platform, TextSender};
use attache_llm::{GatewayConfig, HttpModelClient, LlmGateway};
use attache_pipeline::notify::NotifyTarget;
use attache_pipeline::{
    shutdown, ConcurrencyController, DebounceBuffer, IntakeService, OwnerNotifier,
    ReplyEngine, ReportWorker, SessionLock, SessionTracker, WorkerPool,
};
use attache_storage::queries::queue;
use attache_storage::Database;
use attache_telegram::TelegramTransport;
use attache_tools::side::{SideApi, UnconfiguredSideApi};
use attache_tools::ToolRegistry;
use attache_whatsapp::{WhatsAppTransport, WireSocket};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};

/// Messages API version header sent by the HTTP client.
const API_VERSION: &str = "2023-06-01";

/// External plug points for the serve runtime.
///
/// The wire-level WhatsApp SDK and the calendar/web side tools live outside
/// the core; a build that links them passes its implementations here. With
/// no wire socket the primary transport stays disconnected (Telegram-only
/// operation).
pub struct ServeDeps {
    pub wire_socket: Option<Arc<dyn WireSocket>>,
    pub side_api: Arc<dyn SideApi>,
}

impl Default for ServeDeps {
    fn default() -> Self {
        Self {
            wire_socket: None,
            side_api: Arc::new(UnconfiguredSideApi),
        }
    }
}

/// Entry point for the `serve` subcommand.
pub async fn run_serve() -> Result<(), AttacheError> {
    let config = load_config().map_err(|e| AttacheError::Config(e.to_string()))?;
    run_serve_with(config, ServeDeps::default()).await
}

/// Full runtime with injectable external collaborators.
pub async fn run_serve_with(config: AttacheConfig, deps: ServeDeps) -> Result<(), AttacheError> {
    init_tracing(&config.agent.log_level);
    validate_config(&config)?;

    info!(agent = %config.agent.name, "starting attache serve");

    // Storage plus crash recovery: leases owned by dead workers go back to
    // pending before any new worker starts.
    let db = Arc::new(Database::open_with(&config.storage).await?);
    let recovered = queue::recover_stale(
        &db,
        Duration::from_secs(config.pipeline.lease_timeout_secs),
    )
    .await?;
    if recovered > 0 {
        warn!(recovered, "recovered stale queue leases from a previous run");
    }

    // Singleton gate: only one process may own the transports.
    let lock = Arc::new(SessionLock::acquire(db.clone(), &config.agent.session_name).await?);

    let cancel = shutdown::install_signal_handler();
    // First fatal error wins; everything else is graceful shutdown.
    let fatal: Arc<Mutex<Option<AttacheError>>> = Arc::new(Mutex::new(None));

    // LLM gateway over the configured key pool.
    let client = Arc::new(HttpModelClient::new(API_VERSION)?);
    let gateway = LlmGateway::new(
        GatewayConfig::from_llm_config(&config.llm),
        config.llm.key_pool(),
        client,
    );
    info!(keys = config.llm.key_pool().len(), model = %config.llm.model, "LLM gateway ready");

    // Transports. Inbound events from every transport funnel into one
    // intake channel.
    let (events_tx, mut events_rx) = mpsc::channel(256);

    let whatsapp = deps.wire_socket.map(|socket| {
        Arc::new(WhatsAppTransport::new(socket, db.clone(), events_tx.clone()))
    });
    let whatsapp_status = whatsapp
        .as_ref()
        .map(|t| t.status_handle())
        .unwrap_or_else(|| Arc::new(RwLock::new(Default::default())));

    let telegram = match &config.telegram.bot_token {
        Some(_) => {
            let transport = Arc::new(TelegramTransport::new(&config.telegram, events_tx.clone())?);
            transport.start();
            info!("telegram transport started");
            Some(transport)
        }
        None => {
            info!("telegram transport skipped (no bot_token configured)");
            None
        }
    };

    let mut senders: HashMap<Platform, Arc<dyn TextSender>> = HashMap::new();
    if let Some(wa) = &whatsapp {
        senders.insert(Platform::Whatsapp, wa.clone());
    }
    if let Some(tg) = &telegram {
        senders.insert(Platform::Telegram, tg.clone());
    }

    // Owner notification targets: WhatsApp address and/or Telegram chat.
    let mut notify_targets = Vec::new();
    if let (Some(owner), Some(wa)) = (&config.owner.address, &whatsapp) {
        notify_targets.push(NotifyTarget {
            sender: wa.clone() as Arc<dyn TextSender>,
            address: owner.clone(),
        });
    }
    if let (Some(chat_id), Some(tg)) = (config.telegram.owner_chat_id, &telegram) {
        notify_targets.push(NotifyTarget {
            sender: tg.clone() as Arc<dyn TextSender>,
            address: chat_id.to_string(),
        });
    }
    let notifier = OwnerNotifier::new(notify_targets);

    // Pipeline assembly.
    let stats = Arc::new(attache_core::types::RuntimeStats::new());
    let sessions = SessionTracker::new(
        db.clone(),
        Duration::from_millis(config.pipeline.conversation_timeout_ms),
    );

    let mut registry = ToolRegistry::new();
    attache_tools::builtin::register_builtins(&mut registry);
    info!(tools = registry.len(), "tool registry initialized");

    let engine = ReplyEngine::new(
        db.clone(),
        gateway.clone(),
        Arc::new(registry),
        senders.clone(),
        sessions.clone(),
        stats.clone(),
        deps.side_api,
        config.owner.address.clone(),
    );

    let (debounce, batches_rx) = DebounceBuffer::new(
        Duration::from_millis(config.pipeline.debounce_ms),
        config.pipeline.max_buffer,
    );
    let intake = Arc::new(IntakeService::new(
        db.clone(),
        debounce.clone(),
        sessions.clone(),
        config.owner.address.clone(),
        config.owner.alternate_ids.clone(),
        senders,
    ));

    let pool = WorkerPool::new(
        db.clone(),
        engine.clone(),
        stats.clone(),
        config.pipeline.queue_max_retries,
        cancel.clone(),
    );
    pool.start(config.pipeline.workers).await;

    // Background tasks.
    {
        let intake = intake.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Some(event) => {
                            if let Err(e) = intake.handle_event(event).await {
                                warn!(error = %e, "intake failed on inbound event");
                            }
                        }
                        None => break,
                    },
                    _ = task_cancel.cancelled() => break,
                }
            }
        });
    }
    {
        let intake = intake.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            intake.run_batch_submitter(batches_rx, task_cancel).await;
        });
    }
    {
        let tracker = sessions.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tracker.run(task_cancel).await;
        });
    }
    {
        let controller = ConcurrencyController::new(
            db.clone(),
            pool.clone(),
            gateway.clone(),
            stats.clone(),
            config.pipeline.clone(),
        );
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            controller.run(task_cancel).await;
        });
    }
    {
        let reports = ReportWorker::new(
            db.clone(),
            gateway.clone(),
            notifier,
            config.pipeline.queue_max_retries,
        );
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            reports.run(task_cancel).await;
        });
    }

    // Primary transport lifecycle. A SessionConflict here is fatal.
    if let Some(wa) = whatsapp.clone() {
        let task_cancel = cancel.clone();
        let task_fatal = fatal.clone();
        tokio::spawn(async move {
            if let Err(e) = wa.run(task_cancel.clone()).await {
                error!(error = %e, "primary transport terminated");
                *task_fatal.lock().await = Some(e);
                task_cancel.cancel();
            }
        });
    } else {
        info!("no wire socket provided, primary transport disabled");
    }

    // Lock heartbeat. Losing the lock is fatal.
    {
        let lock = lock.clone();
        let task_cancel = cancel.clone();
        let task_fatal = fatal.clone();
        tokio::spawn(async move {
            if let Err(e) = lock.run_heartbeat(task_cancel.clone()).await {
                *task_fatal.lock().await = Some(e);
                task_cancel.cancel();
            }
        });
    }

    // Admin API plus the disconnect command path.
    let (disconnect_tx, mut disconnect_rx) = mpsc::channel(4);
    if config.admin.enabled {
        let state = AdminState {
            db: db.clone(),
            stats: stats.clone(),
            whatsapp_status,
            telegram_connected: telegram.as_ref().map(|t| t.connected_handle()),
            disconnect_tx,
        };
        let host = config.admin.host.clone();
        let port = config.admin.port;
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = attache_admin::serve(&host, port, state) => {
                    if let Err(e) = result {
                        warn!(error = %e, "admin API stopped");
                    }
                }
                _ = task_cancel.cancelled() => {}
            }
        });
    }
    {
        let whatsapp = whatsapp.clone();
        let lock = lock.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            if disconnect_rx.recv().await.is_some() {
                info!("admin disconnect: logging out and releasing the session");
                if let Some(wa) = &whatsapp {
                    if let Err(e) = attache_core::TransportAdapter::logout(wa.as_ref()).await {
                        warn!(error = %e, "logout failed, wiping credentials anyway");
                        let _ = wa.wipe_credentials().await;
                    }
                }
                if let Err(e) = lock.release().await {
                    warn!(error = %e, "failed to release session lock");
                }
                task_cancel.cancel();
            }
        });
    }

    info!("attache serve running");
    cancel.cancelled().await;
    info!("shutting down");

    // Flush buffered texts so nothing is lost, give the submitter a moment
    // to enqueue them, then drain the workers.
    debounce.flush_all().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.shutdown(Duration::from_secs(config.pipeline.shutdown_grace_secs))
        .await;

    if let Err(e) = lock.release().await {
        warn!(error = %e, "failed to release session lock on shutdown");
    }
    db.close().await?;

    let fatal_err = fatal.lock().await.take();
    match fatal_err {
        Some(e) => {
            error!(error = %e, "exiting after fatal error");
            Err(e)
        }
        None => {
            info!("attache serve shutdown complete");
            Ok(())
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("attache={log_level},warn")));

    // Ignore the error when a test harness installed a subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
