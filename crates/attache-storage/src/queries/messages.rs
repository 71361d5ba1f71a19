// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only message log operations.

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::MessageLog;

fn row_to_log(row: &rusqlite::Row<'_>) -> Result<MessageLog, rusqlite::Error> {
    Ok(MessageLog {
        id: row.get(0)?,
        contact_phone: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        media_kind: row.get(4)?,
        platform: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const LOG_COLUMNS: &str = "id, contact_phone, role, content, media_kind, platform, created_at";

/// Append one log row. Returns the generated row id.
pub async fn append(
    db: &Database,
    contact_phone: &str,
    role: &str,
    content: &str,
    media_kind: &str,
    platform: &str,
) -> Result<String, AttacheError> {
    let id = uuid::Uuid::new_v4().to_string();
    let row_id = id.clone();
    let contact_phone = contact_phone.to_string();
    let role = role.to_string();
    let content = content.to_string();
    let media_kind = media_kind.to_string();
    let platform = platform.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO message_logs (id, contact_phone, role, content, media_kind,
                                           platform, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, contact_phone, role, content, media_kind, platform, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(row_id)
}

/// The last `limit` log rows for a contact, oldest first.
pub async fn history(
    db: &Database,
    contact_phone: &str,
    limit: i64,
) -> Result<Vec<MessageLog>, AttacheError> {
    let contact_phone = contact_phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM (
                     SELECT {LOG_COLUMNS} FROM message_logs
                     WHERE contact_phone = ?1
                     ORDER BY created_at DESC LIMIT ?2
                 ) ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![contact_phone, limit], row_to_log)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

/// Log rows for a contact inside a time window, oldest first. Used to slice
/// out one conversation session for report generation.
pub async fn between(
    db: &Database,
    contact_phone: &str,
    from_iso: &str,
    to_iso: &str,
) -> Result<Vec<MessageLog>, AttacheError> {
    let contact_phone = contact_phone.to_string();
    let from_iso = from_iso.to_string();
    let to_iso = to_iso.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM message_logs
                 WHERE contact_phone = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![contact_phone, from_iso, to_iso], row_to_log)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

/// Substring search. With a contact the search is scoped to that timeline;
/// without, it spans every conversation (owner tools only).
pub async fn search(
    db: &Database,
    contact_phone: Option<&str>,
    needle: &str,
    limit: i64,
) -> Result<Vec<MessageLog>, AttacheError> {
    let contact_phone = contact_phone.map(|s| s.to_string());
    let pattern = format!("%{}%", needle.replace('%', "\\%").replace('_', "\\_"));
    db.connection()
        .call(move |conn| {
            let mut logs = Vec::new();
            match &contact_phone {
                Some(phone) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {LOG_COLUMNS} FROM message_logs
                         WHERE contact_phone = ?1 AND content LIKE ?2 ESCAPE '\\'
                         ORDER BY created_at DESC LIMIT ?3"
                    ))?;
                    let rows = stmt.query_map(params![phone, pattern, limit], row_to_log)?;
                    for row in rows {
                        logs.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {LOG_COLUMNS} FROM message_logs
                         WHERE content LIKE ?1 ESCAPE '\\'
                         ORDER BY created_at DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![pattern, limit], row_to_log)?;
                    for row in rows {
                        logs.push(row?);
                    }
                }
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

/// Log rows newer than the given instant, newest first, across all contacts.
pub async fn since(db: &Database, from_iso: &str, limit: i64) -> Result<Vec<MessageLog>, AttacheError> {
    let from_iso = from_iso.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOG_COLUMNS} FROM message_logs
                 WHERE created_at >= ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![from_iso, limit], row_to_log)?;
            let mut logs = Vec::new();
            for row in rows {
                logs.push(row?);
            }
            Ok(logs)
        })
        .await
        .map_err(map_tr_err)
}

/// Total row count, for analytics and `/api/stats`.
pub async fn count(db: &Database) -> Result<i64, AttacheError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row("SELECT COUNT(*) FROM message_logs", [], |row| row.get(0))?;
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
    async fn append_and_history_in_order() {
        let (db, _dir) = setup_db().await;

        append(&db, "155", "user", "hello", "text", "whatsapp").await.unwrap();
        append(&db, "155", "agent", "hi there", "text", "whatsapp").await.unwrap();
        append(&db, "155", "user", "how are you?", "text", "whatsapp").await.unwrap();

        let logs = history(&db, "155", 50).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].content, "hello");
        assert_eq!(logs[1].role, "agent");
        assert_eq!(logs[2].content, "how are you?");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn history_limit_keeps_most_recent() {
        let (db, _dir) = setup_db().await;

        for i in 0..5 {
            append(&db, "155", "user", &format!("msg {i}"), "text", "whatsapp")
                .await
                .unwrap();
        }

        let logs = history(&db, "155", 2).await.unwrap();
        assert_eq!(logs.len(), 2);
        // The two newest, still oldest-first.
        assert_eq!(logs[0].content, "msg 3");
        assert_eq!(logs[1].content, "msg 4");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn history_is_scoped_per_contact() {
        let (db, _dir) = setup_db().await;

        append(&db, "155", "user", "from alice", "text", "whatsapp").await.unwrap();
        append(&db, "166", "user", "from bob", "text", "telegram").await.unwrap();

        let logs = history(&db, "155", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].content, "from alice");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_scoped_and_global() {
        let (db, _dir) = setup_db().await;

        append(&db, "155", "user", "about the invoice", "text", "whatsapp").await.unwrap();
        append(&db, "166", "user", "another invoice note", "text", "whatsapp").await.unwrap();
        append(&db, "155", "user", "unrelated", "text", "whatsapp").await.unwrap();

        let scoped = search(&db, Some("155"), "invoice", 10).await.unwrap();
        assert_eq!(scoped.len(), 1);

        let global = search(&db, None, "invoice", 10).await.unwrap();
        assert_eq!(global.len(), 2);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn between_slices_a_window() {
        let (db, _dir) = setup_db().await;

        append(&db, "155", "user", "inside", "text", "whatsapp").await.unwrap();
        let logs = between(&db, "155", "2000-01-01T00:00:00.000Z", "2999-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);

        let none = between(&db, "155", "2000-01-01T00:00:00.000Z", "2000-01-02T00:00:00.000Z")
            .await
            .unwrap();
        assert!(none.is_empty());

        db.close().await.unwrap();
    }
}
