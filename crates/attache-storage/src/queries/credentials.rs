// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport credential store.
//!
//! Keys are `collection:id` strings; values are arbitrary byte blobs encoded
//! as JSON with a base64 buffer marker so bytes round-trip exactly. Writes
//! retry on transient storage errors because losing a session key forces a
//! full re-pairing of the transport.

use std::time::Duration;

use attache_core::AttacheError;
use base64::Engine;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::database::{map_tr_err, now_iso, Database};

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF_MS: u64 = 100;

/// Binary-preserving textual encoding of a credential blob.
#[derive(Debug, Serialize, Deserialize)]
struct BufferMarker {
    #[serde(rename = "type")]
    type_: String,
    data: String,
}

fn encode_blob(blob: &[u8]) -> Result<String, AttacheError> {
    let marker = BufferMarker {
        type_: "Buffer".to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(blob),
    };
    serde_json::to_string(&marker)
        .map_err(|e| AttacheError::Internal(format!("failed to encode credential blob: {e}")))
}

fn decode_blob(value: &str) -> Result<Vec<u8>, AttacheError> {
    let marker: BufferMarker = serde_json::from_str(value)
        .map_err(|e| AttacheError::Parse(format!("malformed credential entry: {e}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(marker.data)
        .map_err(|e| AttacheError::Parse(format!("malformed credential base64: {e}")))
}

/// Read a credential blob. Returns `None` when the key is absent.
pub async fn read(db: &Database, key: &str) -> Result<Option<Vec<u8>>, AttacheError> {
    let key = key.to_string();
    let value: Option<String> = db
        .connection()
        .call(move |conn| {
            match conn.query_row(
                "SELECT value FROM auth_credentials WHERE key = ?1",
                params![key],
                |row| row.get(0),
            ) {
                Ok(v) => Ok(Some(v)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)?;
    value.map(|v| decode_blob(&v)).transpose()
}

/// Upsert a credential blob, retrying transient storage errors.
pub async fn write(db: &Database, key: &str, blob: &[u8]) -> Result<(), AttacheError> {
    let encoded = encode_blob(blob)?;
    let mut last_err = None;
    for attempt in 1..=WRITE_ATTEMPTS {
        let key_owned = key.to_string();
        let value = encoded.clone();
        let now = now_iso();
        let result = db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO auth_credentials (key, value, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value, updated_at = excluded.updated_at",
                    params![key_owned, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(key, attempt, error = %e, "credential write failed");
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(WRITE_BACKOFF_MS * attempt as u64))
                    .await;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| AttacheError::Internal("credential write failed".into())))
}

/// Delete one credential entry.
pub async fn remove(db: &Database, key: &str) -> Result<(), AttacheError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM auth_credentials WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every entry in a collection (used when a fatal lifecycle code
/// requires wiping the transport session).
pub async fn wipe_collection(db: &Database, collection: &str) -> Result<usize, AttacheError> {
    let prefix = format!("{collection}:%");
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM auth_credentials WHERE key LIKE ?1",
                params![prefix],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}
