// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline introspection tools (owner only).

use async_trait::async_trait;
use attache_core::AttacheError;
use attache_storage::queries::{contacts, messages, queue, report_queue};

use crate::{Tool, ToolContext, ToolOutput};

/// Live pipeline state: queue depth, worker count, settle counters.
pub struct GetSystemStatusTool;

#[async_trait]
impl Tool for GetSystemStatusTool {
    fn name(&self) -> &str {
        "get_system_status"
    }

    fn description(&self) -> &str {
        "Report the live pipeline state: queue depth, worker count, processed and failed batches"
    }

    fn owner_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn invoke(
        &self,
        _input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let depth = queue::depth(&ctx.db).await?;
        let pending_reports = report_queue::pending_count(&ctx.db).await?;
        Ok(ToolOutput::ok(format!(
            "queue depth {depth}, workers {}, processed {}, failed {}, pending reports {}",
            ctx.stats.workers(),
            ctx.stats.processed(),
            ctx.stats.failed(),
            pending_reports,
        )))
    }
}

/// Aggregate store counters.
pub struct GetAnalyticsTool;

#[async_trait]
impl Tool for GetAnalyticsTool {
    fn name(&self) -> &str {
        "get_analytics"
    }

    fn description(&self) -> &str {
        "Report aggregate counters: contacts known and messages logged"
    }

    fn owner_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn invoke(
        &self,
        _input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let contact_count = contacts::count(&ctx.db).await?;
        let message_count = messages::count(&ctx.db).await?;
        Ok(ToolOutput::ok(format!(
            "{contact_count} contacts, {message_count} messages logged"
        )))
    }
}
