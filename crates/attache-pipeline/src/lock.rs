// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Singleton process lock over the `session_lock` row.
//!
//! Only the lock holder may connect the transports. The holder heartbeats
//! to extend its lease; losing the lock means another process took over and
//! this one must exit for supervisor restart.

use std::sync::Arc;
use std::time::Duration;

use attache_core::AttacheError;
use attache_storage::queries::session_lock;
use attache_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lease length written on acquire and on every heartbeat.
pub const LOCK_TTL: Duration = Duration::from_secs(120);

/// Heartbeat period.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// RAII-style holder of the singleton session lock.
pub struct SessionLock {
    db: Arc<Database>,
    session_name: String,
    holder: String,
}

impl SessionLock {
    /// Acquires the named lock or fails with `SessionConflict` when another
    /// live process holds it.
    pub async fn acquire(db: Arc<Database>, session_name: &str) -> Result<Self, AttacheError> {
        let holder = format!("attache-{}", uuid::Uuid::new_v4());
        let acquired = session_lock::acquire(&db, session_name, &holder, LOCK_TTL).await?;
        if !acquired {
            return Err(AttacheError::SessionConflict(format!(
                "session lock '{session_name}' is held by another process"
            )));
        }
        info!(session = session_name, holder = %holder, "session lock acquired");
        Ok(Self {
            db,
            session_name: session_name.to_string(),
            holder,
        })
    }

    /// Extends the lease until cancelled. Returns `SessionConflict` when the
    /// lock was taken over, which must terminate the process.
    pub async fn run_heartbeat(&self, cancel: CancellationToken) -> Result<(), AttacheError> {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let still_ours = session_lock::heartbeat(
                        &self.db,
                        &self.session_name,
                        &self.holder,
                        LOCK_TTL,
                    )
                    .await?;
                    if !still_ours {
                        warn!(session = %self.session_name, "session lock lost to another process");
                        return Err(AttacheError::SessionConflict(format!(
                            "lost session lock '{}'",
                            self.session_name
                        )));
                    }
                }
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// Releases the lock on graceful shutdown.
    pub async fn release(&self) -> Result<(), AttacheError> {
        session_lock::release(&self.db, &self.session_name, &self.holder).await?;
        info!(session = %self.session_name, "session lock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn second_process_is_rejected_until_release() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lock.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());

        let first = SessionLock::acquire(db.clone(), "main").await.unwrap();
        let second = SessionLock::acquire(db.clone(), "main").await;
        assert!(matches!(second, Err(AttacheError::SessionConflict(_))));

        first.release().await.unwrap();
        let third = SessionLock::acquire(db.clone(), "main").await;
        assert!(third.is_ok());
    }
}
