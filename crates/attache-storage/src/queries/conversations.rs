// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session rows: at most one `active` row per contact; the
//! transition to `completed` is terminal for that row.

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::Conversation;

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    Ok(Conversation {
        id: row.get(0)?,
        contact_phone: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        urgency: row.get(5)?,
        summary: row.get(6)?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, contact_phone, status, started_at, ended_at, urgency, summary";

/// Returns the contact's active conversation, opening one if none exists.
///
/// The insert is guarded by a NOT EXISTS check inside one statement, so two
/// concurrent touches cannot create a second active row.
pub async fn open_if_absent(db: &Database, contact_phone: &str) -> Result<Conversation, AttacheError> {
    let contact_phone = contact_phone.to_string();
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, contact_phone, status, started_at)
                 SELECT ?1, ?2, 'active', ?3
                 WHERE NOT EXISTS (
                     SELECT 1 FROM conversations WHERE contact_phone = ?2 AND status = 'active'
                 )",
                params![id, contact_phone, now],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE contact_phone = ?1 AND status = 'active'"
            ))?;
            let conversation = stmt.query_row(params![contact_phone], row_to_conversation)?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

/// The contact's active conversation, if any.
pub async fn active_for(
    db: &Database,
    contact_phone: &str,
) -> Result<Option<Conversation>, AttacheError> {
    let contact_phone = contact_phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE contact_phone = ?1 AND status = 'active'"
            ))?;
            match stmt.query_row(params![contact_phone], row_to_conversation) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Completes the contact's active conversation and returns it, stamped with
/// `ended_at`. Returns `None` when there was nothing active (idempotent).
pub async fn complete_active(
    db: &Database,
    contact_phone: &str,
) -> Result<Option<Conversation>, AttacheError> {
    let contact_phone = contact_phone.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let found = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE contact_phone = ?1 AND status = 'active'"
                ))?;
                match stmt.query_row(params![contact_phone], row_to_conversation) {
                    Ok(c) => Some(c),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            match found {
                Some(mut conversation) => {
                    tx.execute(
                        "UPDATE conversations SET status = 'completed', ended_at = ?1
                         WHERE id = ?2",
                        params![now, conversation.id],
                    )?;
                    tx.commit()?;
                    conversation.status = "completed".to_string();
                    conversation.ended_at = Some(now);
                    Ok(Some(conversation))
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

/// Get a conversation by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<Conversation>, AttacheError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_conversation) {
                Ok(c) => Ok(Some(c)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Store an analysis result (urgency tag, summary) on a conversation.
pub async fn set_analysis(
    db: &Database,
    id: &str,
    urgency: i64,
    summary: &str,
) -> Result<(), AttacheError> {
    let id = id.to_string();
    let summary = summary.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET urgency = ?1, summary = ?2 WHERE id = ?3",
                params![urgency, summary, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently started conversations across all contacts.
pub async fn recent(db: &Database, limit: i64) -> Result<Vec<Conversation>, AttacheError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 ORDER BY started_at DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_conversation)?;
            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row?);
            }
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}
