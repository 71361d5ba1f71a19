// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool over the persistent queue.
//!
//! Each worker loops lease -> reply pipeline -> settle. Capacity errors
//! (rate limit, key exhaustion) release the lease with delayed visibility
//! instead of counting a failure; anything else bumps the retry count. On
//! shutdown a worker finishes its in-flight item before exiting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use attache_core::types::RuntimeStats;
use attache_storage::queries::queue;
use attache_storage::Database;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reply::ReplyEngine;

/// Sleep between lease attempts when the queue is empty.
const IDLE_POLL: Duration = Duration::from_millis(500);

struct WorkerHandle {
    id: usize,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// A dynamically sized set of queue workers.
pub struct WorkerPool {
    db: Arc<Database>,
    engine: Arc<ReplyEngine>,
    stats: Arc<RuntimeStats>,
    queue_max_retries: i64,
    workers: Mutex<Vec<WorkerHandle>>,
    next_id: AtomicUsize,
    root_cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        db: Arc<Database>,
        engine: Arc<ReplyEngine>,
        stats: Arc<RuntimeStats>,
        queue_max_retries: i64,
        root_cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            engine,
            stats,
            queue_max_retries,
            workers: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            root_cancel,
        })
    }

    /// Spawns workers until the pool holds `count`.
    pub async fn start(self: &Arc<Self>, count: usize) {
        for _ in 0..count {
            self.spawn_worker().await;
        }
    }

    /// Adds one worker.
    pub async fn spawn_worker(self: &Arc<Self>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root_cancel.child_token();
        let pool = self.clone();
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            pool.worker_loop(id, worker_cancel).await;
        });

        let mut workers = self.workers.lock().await;
        workers.push(WorkerHandle { id, cancel, handle });
        self.stats.set_workers(workers.len());
        info!(worker = id, total = workers.len(), "worker started");
    }

    /// Stops the most recently spawned worker. The worker finishes its
    /// in-flight item first.
    pub async fn stop_one(&self) {
        let handle = {
            let mut workers = self.workers.lock().await;
            let handle = workers.pop();
            self.stats.set_workers(workers.len());
            handle
        };
        if let Some(worker) = handle {
            info!(worker = worker.id, "worker stopping");
            worker.cancel.cancel();
            // Detached: the loop notices cancellation at its next idle point.
            drop(worker.handle);
        }
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Cancels every worker and waits up to `grace` for in-flight items.
    pub async fn shutdown(&self, grace: Duration) {
        let drained: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock().await;
            self.stats.set_workers(0);
            workers.drain(..).collect()
        };
        for worker in &drained {
            worker.cancel.cancel();
        }
        let join_all = async {
            for worker in drained {
                let _ = worker.handle.await;
            }
        };
        if tokio::time::timeout(grace, join_all).await.is_err() {
            warn!("shutdown grace elapsed with workers still in flight");
        } else {
            info!("worker pool drained");
        }
    }

    async fn worker_loop(self: Arc<Self>, id: usize, cancel: CancellationToken) {
        let worker_id = format!("worker-{id}");
        debug!(worker = %worker_id, "worker loop entered");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match queue::lease(&self.db, &worker_id).await {
                Ok(Some(item)) => {
                    let item_id = item.id;
                    match self.engine.handle_item(&item).await {
                        Ok(()) => {
                            if let Err(e) = queue::complete(&self.db, item_id).await {
                                error!(worker = %worker_id, item = item_id, error = %e,
                                       "failed to settle completed item");
                            }
                            self.stats.record_processed();
                        }
                        Err(e) if e.is_capacity_exhaustion() => {
                            let visible_at = self.engine.defer_visible_at().await;
                            warn!(worker = %worker_id, item = item_id, until = %visible_at,
                                  "key pool exhausted, deferring batch");
                            if let Err(release_err) =
                                queue::release(&self.db, item_id, &visible_at).await
                            {
                                error!(worker = %worker_id, item = item_id, error = %release_err,
                                       "failed to release deferred item");
                            }
                            // Owners hear about it; everyone else just waits.
                            if self.engine.is_owner(&item.sender) {
                                self.engine.send_error_note(&item.sender, &e).await;
                            }
                        }
                        Err(e) => {
                            error!(worker = %worker_id, item = item_id, error = %e,
                                   "batch processing failed");
                            if let Err(fail_err) = queue::fail(
                                &self.db,
                                item_id,
                                &e.to_string(),
                                self.queue_max_retries,
                            )
                            .await
                            {
                                error!(worker = %worker_id, item = item_id, error = %fail_err,
                                       "failed to settle failed item");
                            }
                            self.stats.record_failed();
                        }
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!(worker = %worker_id, error = %e, "lease query failed");
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }
        debug!(worker = %worker_id, "worker loop exited");
    }
}
