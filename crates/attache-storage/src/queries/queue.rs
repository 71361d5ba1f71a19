// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent priority queue with lease-based dequeue.
//!
//! Dequeue atomically claims the oldest visible pending row with the lowest
//! priority number, skipping senders that already hold a `processing` row so
//! no two workers ever handle the same contact concurrently.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use attache_core::{AttacheError, Priority};
use rusqlite::params;

use crate::database::{iso_after, iso_before, map_tr_err, now_iso, Database};
use crate::models::QueueItem;

/// Base of the linear retry backoff applied when a processing attempt fails.
const RETRY_BACKOFF_SECS: u64 = 30;

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<QueueItem, rusqlite::Error> {
    Ok(QueueItem {
        id: row.get(0)?,
        sender: row.get(1)?,
        kind: row.get(2)?,
        payload: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        retry_count: row.get(6)?,
        worker_id: row.get(7)?,
        error: row.get(8)?,
        content_hash: row.get(9)?,
        visible_at: row.get(10)?,
        leased_at: row.get(11)?,
        created_at: row.get(12)?,
        processed_at: row.get(13)?,
    })
}

const ITEM_COLUMNS: &str = "id, sender, kind, payload, priority, status, retry_count, worker_id,
     error, content_hash, visible_at, leased_at, created_at, processed_at";

/// Hash of kind + sender + texts used to coalesce duplicate enqueues.
pub fn content_hash(kind: &str, sender: &str, texts: &[String]) -> String {
    let mut hasher = DefaultHasher::new();
    kind.hash(&mut hasher);
    sender.hash(&mut hasher);
    texts.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Enqueue one batch. If an identical batch (same sender, same content hash)
/// is already `pending`, the existing row id is returned instead of inserting
/// a duplicate.
pub async fn enqueue(
    db: &Database,
    sender: &str,
    texts: &[String],
    priority: Priority,
) -> Result<i64, AttacheError> {
    enqueue_kind(db, "reply", sender, texts, priority).await
}

/// Enqueue a background profiling pass for one contact at LOW priority.
/// Coalesces with any profiling item already pending for that contact.
pub async fn enqueue_profiling(db: &Database, sender: &str) -> Result<i64, AttacheError> {
    enqueue_kind(db, "profile", sender, &[], Priority::Low).await
}

async fn enqueue_kind(
    db: &Database,
    kind: &str,
    sender: &str,
    texts: &[String],
    priority: Priority,
) -> Result<i64, AttacheError> {
    let hash = content_hash(kind, sender, texts);
    let kind = kind.to_string();
    let sender = sender.to_string();
    let payload = serde_json::to_string(texts).map_err(|e| AttacheError::Internal(format!(
        "failed to encode queue payload: {e}"
    )))?;
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM message_queue
                     WHERE sender = ?1 AND content_hash = ?2 AND status = 'pending'
                     LIMIT 1",
                )?;
                match stmt.query_row(params![sender, hash], |row| row.get(0)) {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO message_queue (sender, kind, payload, priority, status,
                             content_hash, visible_at, created_at)
                         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
                        params![sender, kind, payload, priority.as_i64(), hash, now],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically lease the next batch for `worker_id`.
///
/// Selection order: lowest priority number, then oldest `created_at`. Rows
/// whose `visible_at` lies in the future are skipped, as are rows for senders
/// that already have a batch `processing` (the per-contact advisory lock).
pub async fn lease(db: &Database, worker_id: &str) -> Result<Option<QueueItem>, AttacheError> {
    let worker_id = worker_id.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let found = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM message_queue
                     WHERE status = 'pending' AND visible_at <= ?1
                       AND sender NOT IN (
                           SELECT sender FROM message_queue WHERE status = 'processing'
                       )
                     ORDER BY priority ASC, created_at ASC
                     LIMIT 1"
                ))?;
                match stmt.query_row(params![now], row_to_item) {
                    Ok(item) => Some(item),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            match found {
                Some(mut item) => {
                    tx.execute(
                        "UPDATE message_queue
                         SET status = 'processing', worker_id = ?1, leased_at = ?2
                         WHERE id = ?3",
                        params![worker_id, now, item.id],
                    )?;
                    tx.commit()?;
                    item.status = "processing".to_string();
                    item.worker_id = Some(worker_id);
                    item.leased_at = Some(now);
                    Ok(Some(item))
                }
                None => {
                    tx.commit()?;
                    Ok(None)
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Settle a leased row as successfully processed.
pub async fn complete(db: &Database, id: i64) -> Result<(), AttacheError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue SET status = 'completed', processed_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Settle a leased row as failed: bump the retry count and either re-queue
/// with a linear backoff or mark it permanently failed at `max_retries`.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    max_retries: i64,
) -> Result<(), AttacheError> {
    let error = error.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let retry_count: i64 = conn.query_row(
                "SELECT retry_count FROM message_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let new_count = retry_count + 1;
            if new_count >= max_retries {
                conn.execute(
                    "UPDATE message_queue
                     SET status = 'failed', retry_count = ?1, error = ?2,
                         worker_id = NULL, leased_at = NULL, processed_at = ?3
                     WHERE id = ?4",
                    params![new_count, error, now, id],
                )?;
            } else {
                let visible = iso_after(Duration::from_secs(
                    RETRY_BACKOFF_SECS * new_count as u64,
                ));
                conn.execute(
                    "UPDATE message_queue
                     SET status = 'pending', retry_count = ?1, error = ?2,
                         worker_id = NULL, leased_at = NULL, visible_at = ?3
                     WHERE id = ?4",
                    params![new_count, error, visible, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Release a leased row back to pending without counting an attempt, hidden
/// until `visible_at`. Used when the key pool is exhausted: the batch is not
/// at fault, it just has to wait for a key to cool down.
pub async fn release(db: &Database, id: i64, visible_at: &str) -> Result<(), AttacheError> {
    let visible_at = visible_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE message_queue
                 SET status = 'pending', worker_id = NULL, leased_at = NULL, visible_at = ?1
                 WHERE id = ?2",
                params![visible_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reset `processing` rows whose lease is older than `lease_timeout` back to
/// pending. Run at startup and periodically to recover from dead workers.
pub async fn recover_stale(db: &Database, lease_timeout: Duration) -> Result<usize, AttacheError> {
    let cutoff = iso_before(lease_timeout);
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE message_queue
                 SET status = 'pending', worker_id = NULL, leased_at = NULL
                 WHERE status = 'processing' AND leased_at < ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete completed/failed rows older than the retention window.
pub async fn purge_settled(db: &Database, ttl: Duration) -> Result<usize, AttacheError> {
    let cutoff = iso_before(ttl);
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM message_queue
                 WHERE status IN ('completed', 'failed') AND created_at < ?1",
                params![cutoff],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending backlog size (including rows temporarily hidden by `visible_at`).
pub async fn depth(db: &Database) -> Result<i64, AttacheError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM message_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one row by id (tests and diagnostics).
pub async fn get(db: &Database, id: i64) -> Result<Option<QueueItem>, AttacheError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM message_queue WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_item) {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}
