// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact upsert and profile operations.

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::Contact;

fn row_to_contact(row: &rusqlite::Row<'_>) -> Result<Contact, rusqlite::Error> {
    Ok(Contact {
        phone: row.get(0)?,
        display_name: row.get(1)?,
        confirmed_name: row.get(2)?,
        verified: row.get::<_, i64>(3)? != 0,
        trust_level: row.get(4)?,
        summary: row.get(5)?,
        platform: row.get(6)?,
        created_at: row.get(7)?,
        last_seen_at: row.get(8)?,
    })
}

const CONTACT_COLUMNS: &str = "phone, display_name, confirmed_name, verified, trust_level,
     summary, platform, created_at, last_seen_at";

/// Upsert a contact on an inbound message.
///
/// Inserts with `verified=false` and trust 0 on first contact. On conflict
/// refreshes `last_seen_at` and backfills a missing display name; the
/// original `created_at` is preserved, so repeating the upsert is idempotent.
pub async fn upsert_on_inbound(
    db: &Database,
    phone: &str,
    display_name: Option<&str>,
    platform: &str,
) -> Result<Contact, AttacheError> {
    let phone = phone.to_string();
    let display_name = display_name.map(|s| s.to_string());
    let platform = platform.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (phone, display_name, verified, trust_level, platform,
                                       created_at, last_seen_at)
                 VALUES (?1, ?2, 0, 0, ?3, ?4, ?4)
                 ON CONFLICT(phone) DO UPDATE SET
                     last_seen_at = excluded.last_seen_at,
                     display_name = COALESCE(contacts.display_name, excluded.display_name)",
                params![phone, display_name, platform, now],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone = ?1"
            ))?;
            let contact = stmt.query_row(params![phone], row_to_contact)?;
            Ok(contact)
        })
        .await
        .map_err(map_tr_err)
}

/// Get a contact by normalized address.
pub async fn get(db: &Database, phone: &str) -> Result<Option<Contact>, AttacheError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE phone = ?1"
            ))?;
            match stmt.query_row(params![phone], row_to_contact) {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record a confirmed name from the `update_contact_info` tool and mark the
/// contact verified. Re-applying the same name is a no-op.
pub async fn confirm_name(db: &Database, phone: &str, name: &str) -> Result<(), AttacheError> {
    let phone = phone.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET confirmed_name = ?1, verified = 1 WHERE phone = ?2",
                params![name, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a partial profiling update (summary and/or trust level).
pub async fn apply_profile_update(
    db: &Database,
    phone: &str,
    summary: Option<&str>,
    trust_level: Option<i64>,
) -> Result<(), AttacheError> {
    let phone = phone.to_string();
    let summary = summary.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET
                     summary = COALESCE(?1, summary),
                     trust_level = COALESCE(?2, trust_level)
                 WHERE phone = ?3",
                params![summary, trust_level, phone],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// List contacts ordered by most recently seen.
pub async fn list(db: &Database, limit: i64) -> Result<Vec<Contact>, AttacheError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY last_seen_at DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_contact)?;
            let mut contacts = Vec::new();
            for row in rows {
                contacts.push(row?);
            }
            Ok(contacts)
        })
        .await
        .map_err(map_tr_err)
}

/// Total contact count, for the analytics tool and `/api/stats`.
pub async fn count(db: &Database) -> Result<i64, AttacheError> {
    db.connection()
        .call(|conn| {
            let n = conn.query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))?;
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
    async fn first_inbound_creates_unverified_contact() {
        let (db, _dir) = setup_db().await;

        let contact = upsert_on_inbound(&db, "15551234567", Some("Alice"), "whatsapp")
            .await
            .unwrap();
        assert_eq!(contact.phone, "15551234567");
        assert_eq!(contact.display_name.as_deref(), Some("Alice"));
        assert!(!contact.verified);
        assert_eq!(contact.trust_level, 0);
        assert!(contact.confirmed_name.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_upsert_preserves_created_at_and_yields_one_row() {
        let (db, _dir) = setup_db().await;

        let first = upsert_on_inbound(&db, "15551234567", None, "whatsapp")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = upsert_on_inbound(&db, "15551234567", Some("Alice"), "whatsapp")
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_seen_at >= first.last_seen_at);
        // Display name backfilled on the second touch.
        assert_eq!(second.display_name.as_deref(), Some("Alice"));
        assert_eq!(count(&db).await.unwrap(), 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn existing_display_name_is_not_overwritten() {
        let (db, _dir) = setup_db().await;

        upsert_on_inbound(&db, "155", Some("Alice"), "whatsapp")
            .await
            .unwrap();
        let contact = upsert_on_inbound(&db, "155", Some("Something Else"), "whatsapp")
            .await
            .unwrap();
        assert_eq!(contact.display_name.as_deref(), Some("Alice"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn confirm_name_marks_verified_and_is_idempotent() {
        let (db, _dir) = setup_db().await;

        upsert_on_inbound(&db, "155", None, "whatsapp").await.unwrap();
        confirm_name(&db, "155", "Alice Martin").await.unwrap();
        confirm_name(&db, "155", "Alice Martin").await.unwrap();

        let contact = get(&db, "155").await.unwrap().unwrap();
        assert!(contact.verified);
        assert_eq!(contact.confirmed_name.as_deref(), Some("Alice Martin"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let (db, _dir) = setup_db().await;

        upsert_on_inbound(&db, "155", None, "telegram").await.unwrap();
        apply_profile_update(&db, "155", Some("asks about invoices"), None)
            .await
            .unwrap();
        apply_profile_update(&db, "155", None, Some(4)).await.unwrap();

        let contact = get(&db, "155").await.unwrap().unwrap();
        assert_eq!(contact.summary.as_deref(), Some("asks about invoices"));
        assert_eq!(contact.trust_level, 4);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_unknown_contact_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get(&db, "nobody").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
