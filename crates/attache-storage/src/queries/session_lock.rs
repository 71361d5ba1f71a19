// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Singleton session lock gating transport connection.
//!
//! One process at a time may hold the named lock. Acquisition is a
//! conditional insert/update that only succeeds when the row is absent or
//! expired; the holder heartbeats to extend `expires_at` and releases on
//! shutdown. A crashed process simply lets the row expire.

use std::time::Duration;

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{iso_after, map_tr_err, now_iso, Database};

/// Attempt to acquire the lock for `holder`, valid for `ttl`.
///
/// Returns `true` when this process now holds the lock, `false` when another
/// live holder owns it.
pub async fn acquire(
    db: &Database,
    session_name: &str,
    holder: &str,
    ttl: Duration,
) -> Result<bool, AttacheError> {
    let session_name = session_name.to_string();
    let holder = holder.to_string();
    let now = now_iso();
    let expires = iso_after(ttl);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            // Insert wins when the row is absent.
            let inserted = tx.execute(
                "INSERT INTO session_lock (session_name, holder, expires_at)
                 SELECT ?1, ?2, ?3
                 WHERE NOT EXISTS (SELECT 1 FROM session_lock WHERE session_name = ?1)",
                params![session_name, holder, expires],
            )?;
            let acquired = if inserted > 0 {
                true
            } else {
                // Take over only when expired or already ours.
                let updated = tx.execute(
                    "UPDATE session_lock SET holder = ?2, expires_at = ?3
                     WHERE session_name = ?1 AND (expires_at < ?4 OR holder = ?2)",
                    params![session_name, holder, expires, now],
                )?;
                updated > 0
            };
            tx.commit()?;
            Ok(acquired)
        })
        .await
        .map_err(map_tr_err)
}

/// Extend the holder's lease. Returns `false` when the lock is no longer
/// ours, which means another process took over and we must stop.
pub async fn heartbeat(
    db: &Database,
    session_name: &str,
    holder: &str,
    ttl: Duration,
) -> Result<bool, AttacheError> {
    let session_name = session_name.to_string();
    let holder = holder.to_string();
    let expires = iso_after(ttl);
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE session_lock SET expires_at = ?1
                 WHERE session_name = ?2 AND holder = ?3",
                params![expires, session_name, holder],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Release the lock if this holder still owns it.
pub async fn release(db: &Database, session_name: &str, holder: &str) -> Result<(), AttacheError> {
    let session_name = session_name.to_string();
    let holder = holder.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM session_lock WHERE session_name = ?1 AND holder = ?2",
                params![session_name, holder],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
