// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue metrics samples recorded by the concurrency controller.

use attache_core::AttacheError;
use rusqlite::params;

use crate::database::{map_tr_err, now_iso, Database};
use crate::models::MetricsSample;

/// Record one controller sample.
pub async fn record(
    db: &Database,
    depth: i64,
    workers: i64,
    error_rate: f64,
) -> Result<(), AttacheError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queue_metrics (sampled_at, depth, workers, error_rate)
                 VALUES (?1, ?2, ?3, ?4)",
                params![now, depth, workers, error_rate],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent samples, newest first.
pub async fn recent(db: &Database, limit: i64) -> Result<Vec<MetricsSample>, AttacheError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sampled_at, depth, workers, error_rate
                 FROM queue_metrics ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(MetricsSample {
                    id: row.get(0)?,
                    sampled_at: row.get(1)?,
                    depth: row.get(2)?,
                    workers: row.get(3)?,
                    error_rate: row.get(4)?,
                })
            })?;
            let mut samples = Vec::new();
            for row in rows {
                samples.push(row?);
            }
            Ok(samples)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn record_and_read_back_samples() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        record(&db, 5, 4, 0.0).await.unwrap();
        record(&db, 9, 5, 0.1).await.unwrap();

        let samples = recent(&db, 10).await.unwrap();
        assert_eq!(samples.len(), 2);
        // Newest first.
        assert_eq!(samples[0].depth, 9);
        assert_eq!(samples[0].workers, 5);
        assert!((samples[0].error_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(samples[1].depth, 5);

        db.close().await.unwrap();
    }
}
