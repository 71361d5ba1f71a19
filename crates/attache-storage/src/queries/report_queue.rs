// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report queue: pending end-of-session summary tasks.

use std::time::Duration;

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{iso_after, map_tr_err, now_iso, Database};
use crate::models::ReportItem;

const RETRY_BACKOFF_SECS: u64 = 60;

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<ReportItem, rusqlite::Error> {
    Ok(ReportItem {
        id: row.get(0)?,
        contact_phone: row.get(1)?,
        display_name: row.get(2)?,
        conversation_id: row.get(3)?,
        status: row.get(4)?,
        retry_count: row.get(5)?,
        last_attempt_at: row.get(6)?,
        last_user_message_at: row.get(7)?,
        error: row.get(8)?,
        visible_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const ITEM_COLUMNS: &str = "id, contact_phone, display_name, conversation_id, status,
     retry_count, last_attempt_at, last_user_message_at, error, visible_at, created_at";

/// Enqueue a summary task for a completed conversation. One task per
/// conversation: re-enqueueing the same conversation id is a no-op.
pub async fn enqueue(
    db: &Database,
    contact_phone: &str,
    display_name: Option<&str>,
    conversation_id: &str,
    last_user_message_at: Option<&str>,
) -> Result<i64, AttacheError> {
    let contact_phone = contact_phone.to_string();
    let display_name = display_name.map(|s| s.to_string());
    let conversation_id = conversation_id.to_string();
    let last_user_message_at = last_user_message_at.map(|s| s.to_string());
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM report_queue WHERE conversation_id = ?1 LIMIT 1",
                )?;
                match stmt.query_row(params![conversation_id], |row| row.get(0)) {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    tx.execute(
                        "INSERT INTO report_queue (contact_phone, display_name, conversation_id,
                             status, last_user_message_at, visible_at, created_at)
                         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?5)",
                        params![
                            contact_phone,
                            display_name,
                            conversation_id,
                            last_user_message_at,
                            now
                        ],
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

/// Lease the oldest visible pending report.
pub async fn lease(db: &Database) -> Result<Option<ReportItem>, AttacheError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let found = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM report_queue
                     WHERE status = 'pending' AND visible_at <= ?1
                     ORDER BY created_at ASC LIMIT 1"
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
                        "UPDATE report_queue SET status = 'processing', last_attempt_at = ?1
                         WHERE id = ?2",
                        params![now, item.id],
                    )?;
                    tx.commit()?;
                    item.status = "processing".to_string();
                    item.last_attempt_at = Some(now);
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

/// Mark a report delivered.
pub async fn complete(db: &Database, id: i64) -> Result<(), AttacheError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE report_queue SET status = 'completed' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt: retry with linear backoff, or mark failed once
/// `max_retries` is reached.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    max_retries: i64,
) -> Result<(), AttacheError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let retry_count: i64 = conn.query_row(
                "SELECT retry_count FROM report_queue WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let new_count = retry_count + 1;
            if new_count >= max_retries {
                conn.execute(
                    "UPDATE report_queue SET status = 'failed', retry_count = ?1, error = ?2
                     WHERE id = ?3",
                    params![new_count, error, id],
                )?;
            } else {
                let visible = iso_after(Duration::from_secs(
                    RETRY_BACKOFF_SECS * new_count as u64,
                ));
                conn.execute(
                    "UPDATE report_queue
                     SET status = 'pending', retry_count = ?1, error = ?2, visible_at = ?3
                     WHERE id = ?4",
                    params![new_count, error, visible, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Put a leased report back to pending without counting an attempt, hidden
/// until `visible_at`. Used while the key pool cools down.
pub async fn release(db: &Database, id: i64, visible_at: &str) -> Result<(), AttacheError> {
    let visible_at = visible_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE report_queue SET status = 'pending', visible_at = ?1 WHERE id = ?2",
                params![visible_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Pending report count (tests and `/api/stats`).
pub async fn pending_count(db: &Database) -> Result<i64, AttacheError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM report_queue WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn enqueue_lease_complete_lifecycle() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "155", Some("Alice"), "conv-1", None).await.unwrap();
        assert!(id > 0);
        assert_eq!(pending_count(&db).await.unwrap(), 1);

        let item = lease(&db).await.unwrap().unwrap();
        assert_eq!(item.id, id);
        assert_eq!(item.conversation_id, "conv-1");
        assert_eq!(item.status, "processing");
        assert!(item.last_attempt_at.is_some());

        assert!(lease(&db).await.unwrap().is_none());

        complete(&db, id).await.unwrap();
        assert_eq!(pending_count(&db).await.unwrap(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn one_report_per_conversation() {
        let (db, _dir) = setup_db().await;

        let id1 = enqueue(&db, "155", None, "conv-1", None).await.unwrap();
        let id2 = enqueue(&db, "155", None, "conv-1", None).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(pending_count(&db).await.unwrap(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fail_backs_off_then_marks_failed() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "155", None, "conv-1", None).await.unwrap();
        let _ = lease(&db).await.unwrap().unwrap();

        fail(&db, id, "no keys", 3).await.unwrap();
        // Backed off: pending but not visible.
        assert_eq!(pending_count(&db).await.unwrap(), 1);
        assert!(lease(&db).await.unwrap().is_none());

        release(&db, id, &now_iso()).await.unwrap();
        let _ = lease(&db).await.unwrap().unwrap();
        fail(&db, id, "no keys", 3).await.unwrap();
        release(&db, id, &now_iso()).await.unwrap();
        let _ = lease(&db).await.unwrap().unwrap();
        fail(&db, id, "no keys", 3).await.unwrap();

        // Third failure is terminal.
        assert_eq!(pending_count(&db).await.unwrap(), 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_defers_without_burning_retries() {
        let (db, _dir) = setup_db().await;

        let id = enqueue(&db, "155", None, "conv-1", None).await.unwrap();
        let _ = lease(&db).await.unwrap().unwrap();

        release(&db, id, &iso_after(Duration::from_secs(120))).await.unwrap();
        assert!(lease(&db).await.unwrap().is_none());

        release(&db, id, &now_iso()).await.unwrap();
        let item = lease(&db).await.unwrap().unwrap();
        assert_eq!(item.retry_count, 0);

        db.close().await.unwrap();
    }
}
