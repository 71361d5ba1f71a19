// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `get_current_time`.

use async_trait::async_trait;
use attache_core::AttacheError;

use crate::{Tool, ToolContext, ToolOutput};

pub struct GetCurrentTimeTool;

#[async_trait]
impl Tool for GetCurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local date, time, and timezone"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn invoke(
        &self,
        _input: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let now = chrono::Local::now();
        Ok(ToolOutput::ok(
            now.format("%A %Y-%m-%d %H:%M:%S %Z").to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::side::UnconfiguredSideApi;
    use attache_core::types::RuntimeStats;
    use attache_storage::Database;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn returns_a_dated_string() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("t.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        let ctx = ToolContext {
            db,
            contact_phone: "155".to_string(),
            is_owner: false,
            stats: Arc::new(RuntimeStats::new()),
            side: Arc::new(UnconfiguredSideApi),
        };

        let out = GetCurrentTimeTool
            .invoke(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);
        let year = chrono::Local::now().format("%Y").to_string();
        assert!(out.content.contains(&year));

        let _ = dir;
    }
}
