// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concurrency controller.
//!
//! Samples queue depth and recent error rate on an interval, records each
//! sample into `queue_metrics`, and adjusts the worker pool: up one after
//! two consecutive high-watermark samples with a healthy error rate, down
//! one below the low watermark. Never scales up while the key pool is
//! exhausted. The controller also owns queue housekeeping (stale-lease
//! recovery, settled-row purging).

use std::sync::Arc;
use std::time::Duration;

use attache_config::model::PipelineConfig;
use attache_core::{types::RuntimeStats, AttacheError};
use attache_llm::LlmGateway;
use attache_storage::queries::{metrics, queue};
use attache_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic pool sizing over live queue metrics.
pub struct ConcurrencyController {
    db: Arc<Database>,
    pool: Arc<crate::worker::WorkerPool>,
    gateway: Arc<LlmGateway>,
    stats: Arc<RuntimeStats>,
    config: PipelineConfig,
    consecutive_high: u32,
}

impl ConcurrencyController {
    pub fn new(
        db: Arc<Database>,
        pool: Arc<crate::worker::WorkerPool>,
        gateway: Arc<LlmGateway>,
        stats: Arc<RuntimeStats>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            pool,
            gateway,
            stats,
            config,
            consecutive_high: 0,
        }
    }

    /// Samples and adjusts until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.autoscale_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick; the pool just started.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample_and_adjust().await {
                        warn!(error = %e, "controller sample failed");
                    }
                    if let Err(e) = self.housekeeping().await {
                        warn!(error = %e, "queue housekeeping failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("concurrency controller stopping");
                    break;
                }
            }
        }
    }

    /// One sampling step. Exposed for tests.
    pub async fn sample_and_adjust(&mut self) -> Result<(), AttacheError> {
        let depth = queue::depth(&self.db).await?;
        let error_rate = self.stats.error_rate();
        let workers = self.pool.worker_count().await;

        metrics::record(&self.db, depth, workers as i64, error_rate).await?;
        debug!(depth, workers, error_rate, "controller sample");

        if depth > self.config.high_watermark {
            self.consecutive_high += 1;
        } else {
            self.consecutive_high = 0;
        }

        if self.consecutive_high >= 2
            && error_rate < self.config.error_rate_threshold
            && workers < self.config.max_workers
        {
            if self.gateway.is_exhausted().await {
                debug!("scale-up suppressed: key pool exhausted");
            } else {
                info!(workers = workers + 1, depth, "scaling worker pool up");
                self.pool.spawn_worker().await;
                self.consecutive_high = 0;
            }
        } else if depth < self.config.low_watermark && workers > self.config.min_workers {
            info!(workers = workers - 1, depth, "scaling worker pool down");
            self.pool.stop_one().await;
        }

        Ok(())
    }

    /// Stale-lease recovery and settled-row purging.
    async fn housekeeping(&self) -> Result<(), AttacheError> {
        let recovered = queue::recover_stale(
            &self.db,
            Duration::from_secs(self.config.lease_timeout_secs),
        )
        .await?;
        if recovered > 0 {
            warn!(recovered, "reset stale leases from dead workers");
        }
        let purged =
            queue::purge_settled(&self.db, Duration::from_secs(self.config.queue_ttl_secs))
                .await?;
        if purged > 0 {
            debug!(purged, "purged settled queue rows");
        }
        Ok(())
    }
}
