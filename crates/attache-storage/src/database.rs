// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::time::Duration;

use attache_config::model::StorageConfig;
use attache_core::AttacheError;
use tracing::debug;

/// Shared async handle to the SQLite database.
///
/// Opening runs PRAGMA setup and embedded migrations before any query is
/// accepted. Query modules accept `&Database` and go through
/// [`Database::connection`].
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` with WAL mode.
    pub async fn open(path: &str) -> Result<Self, AttacheError> {
        Self::open_inner(path, true).await
    }

    /// Opens the database honoring the configured journal mode.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, AttacheError> {
        Self::open_inner(&config.database_path, config.wal_mode).await
    }

    async fn open_inner(path: &str, wal_mode: bool) -> Result<Self, AttacheError> {
        // PRAGMAs and migrations run on a plain blocking connection so the
        // refinery runner sees `&mut rusqlite::Connection` directly.
        let setup_path = path.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), AttacheError> {
            let mut conn =
                rusqlite::Connection::open(&setup_path).map_err(|e| AttacheError::Storage {
                    source: Box::new(e),
                })?;
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal};
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;"
            ))
            .map_err(|e| AttacheError::Storage {
                source: Box::new(e),
            })?;
            crate::migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| AttacheError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// Returns the underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL and flushes pending writes.
    pub async fn close(&self) -> Result<(), AttacheError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Maps a tokio-rusqlite error into the crate error type.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> AttacheError {
    AttacheError::Storage {
        source: Box::new(e),
    }
}

/// Current UTC time in the same millisecond ISO form SQLite's
/// `strftime('%Y-%m-%dT%H:%M:%fZ','now')` produces, so Rust-side and
/// SQL-side timestamps stay lexicographically comparable.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// ISO timestamp `delay` in the future, for delayed queue visibility.
pub fn iso_after(delay: Duration) -> String {
    let delta = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    (chrono::Utc::now() + delta)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// ISO timestamp `age` in the past, for staleness cutoffs.
pub fn iso_before(age: Duration) -> String {
    let delta = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
    (chrono::Utc::now() - delta)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_database_file_and_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("open.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());

        // All ten tables exist after migration.
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN (
                        'contacts','message_logs','auth_credentials','session_lock',
                        'conversations','ai_profile','user_profile','message_queue',
                        'queue_metrics','report_queue')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 10);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reopen.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
        drop(db);

        // Migrations already applied; second open must not fail.
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[test]
    fn iso_helpers_are_ordered() {
        let before = iso_before(Duration::from_secs(60));
        let now = now_iso();
        let after = iso_after(Duration::from_secs(60));
        assert!(before < now, "{before} < {now}");
        assert!(now < after, "{now} < {after}");
    }

    #[test]
    fn now_iso_matches_sqlite_strftime_shape() {
        let ts = now_iso();
        // 2026-08-02T12:34:56.789Z
        assert_eq!(ts.len(), 24, "got {ts}");
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
        assert_eq!(&ts[19..20], ".");
    }
}
