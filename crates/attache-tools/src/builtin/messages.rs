// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-log and conversation lookup tools.

use async_trait::async_trait;
use attache_core::AttacheError;
use attache_storage::models::MessageLog;
use attache_storage::queries::{contacts, conversations, messages};

use crate::{Tool, ToolContext, ToolOutput};

const DEFAULT_LIMIT: i64 = 20;

fn render_logs(logs: &[MessageLog]) -> String {
    if logs.is_empty() {
        return "no matching messages".to_string();
    }
    logs.iter()
        .map(|log| format!("[{} {} {}] {}", log.created_at, log.contact_phone, log.role, log.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Search the current sender's own timeline.
pub struct SearchMessagesTool;

#[async_trait]
impl Tool for SearchMessagesTool {
    fn name(&self) -> &str {
        "search_messages"
    }

    fn description(&self) -> &str {
        "Search this conversation's message history for a text fragment"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to search for" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
            },
            "required": ["query"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let Some(query) = input["query"].as_str().filter(|q| !q.trim().is_empty()) else {
            return Ok(ToolOutput::error("query is required"));
        };
        let limit = input["limit"].as_i64().unwrap_or(DEFAULT_LIMIT).clamp(1, 50);
        let logs = messages::search(&ctx.db, Some(&ctx.contact_phone), query, limit).await?;
        Ok(ToolOutput::ok(render_logs(&logs)))
    }
}

/// Search every conversation (owner only).
pub struct SearchAllConversationsTool;

#[async_trait]
impl Tool for SearchAllConversationsTool {
    fn name(&self) -> &str {
        "search_all_conversations"
    }

    fn description(&self) -> &str {
        "Search the message history of every contact for a text fragment"
    }

    fn owner_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Text to search for" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
            },
            "required": ["query"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let Some(query) = input["query"].as_str().filter(|q| !q.trim().is_empty()) else {
            return Ok(ToolOutput::error("query is required"));
        };
        let limit = input["limit"].as_i64().unwrap_or(DEFAULT_LIMIT).clamp(1, 50);
        let logs = messages::search(&ctx.db, None, query, limit).await?;
        Ok(ToolOutput::ok(render_logs(&logs)))
    }
}

/// Most recent conversation sessions (owner only).
pub struct GetRecentConversationsTool;

#[async_trait]
impl Tool for GetRecentConversationsTool {
    fn name(&self) -> &str {
        "get_recent_conversations"
    }

    fn description(&self) -> &str {
        "List the most recent conversation sessions across all contacts"
    }

    fn owner_only(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
            }
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let limit = input["limit"].as_i64().unwrap_or(10).clamp(1, 50);
        let sessions = conversations::recent(&ctx.db, limit).await?;
        if sessions.is_empty() {
            return Ok(ToolOutput::ok("no conversations yet"));
        }
        let lines: Vec<String> = sessions
            .iter()
            .map(|c| {
                format!(
                    "{} [{}] started {}{}{}",
                    c.contact_phone,
                    c.status,
                    c.started_at,
                    c.urgency.map(|u| format!(", urgency {u}/10")).unwrap_or_default(),
                    c.summary
                        .as_deref()
                        .map(|s| format!(": {s}"))
                        .unwrap_or_default(),
                )
            })
            .collect();
        Ok(ToolOutput::ok(lines.join("\n")))
    }
}

/// Today's traffic at a glance (owner only).
pub struct GetDailySummaryTool;

#[async_trait]
impl Tool for GetDailySummaryTool {
    fn name(&self) -> &str {
        "get_daily_summary"
    }

    fn description(&self) -> &str {
        "Summarize today's message traffic: who wrote and how much"
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
        let midnight = chrono::Utc::now()
            .format("%Y-%m-%dT00:00:00.000Z")
            .to_string();
        let logs = messages::since(&ctx.db, &midnight, 500).await?;
        if logs.is_empty() {
            return Ok(ToolOutput::ok("no messages today"));
        }

        let mut per_contact: std::collections::BTreeMap<String, (usize, usize)> =
            std::collections::BTreeMap::new();
        for log in &logs {
            let entry = per_contact.entry(log.contact_phone.clone()).or_default();
            if log.role == "user" {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }

        let mut lines = vec![format!(
            "{} messages today across {} contacts",
            logs.len(),
            per_contact.len()
        )];
        for (phone, (inbound, outbound)) in &per_contact {
            let name = contacts::get(&ctx.db, phone)
                .await?
                .and_then(|c| c.confirmed_name.or(c.display_name))
                .unwrap_or_else(|| phone.clone());
            lines.push(format!("- {name}: {inbound} in / {outbound} out"));
        }
        Ok(ToolOutput::ok(lines.join("\n")))
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

    async fn ctx(is_owner: bool) -> (ToolContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("t.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        messages::append(&db, "155", "user", "about the invoice", "text", "whatsapp")
            .await
            .unwrap();
        messages::append(&db, "166", "user", "other invoice talk", "text", "whatsapp")
            .await
            .unwrap();
        (
            ToolContext {
                db,
                contact_phone: "155".to_string(),
                is_owner,
                stats: Arc::new(RuntimeStats::new()),
                side: Arc::new(UnconfiguredSideApi),
            },
            dir,
        )
    }

    #[tokio::test]
    async fn search_messages_is_scoped_to_sender() {
        let (ctx, _dir) = ctx(false).await;
        let out = SearchMessagesTool
            .invoke(serde_json::json!({"query": "invoice"}), &ctx)
            .await
            .unwrap();
        assert!(out.content.contains("about the invoice"));
        assert!(!out.content.contains("other invoice talk"));
    }

    #[tokio::test]
    async fn search_all_spans_contacts() {
        let (ctx, _dir) = ctx(true).await;
        let out = SearchAllConversationsTool
            .invoke(serde_json::json!({"query": "invoice"}), &ctx)
            .await
            .unwrap();
        assert!(out.content.contains("about the invoice"));
        assert!(out.content.contains("other invoice talk"));
    }

    #[tokio::test]
    async fn missing_query_is_a_tool_error() {
        let (ctx, _dir) = ctx(false).await;
        let out = SearchMessagesTool
            .invoke(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn daily_summary_counts_directions() {
        let (ctx, _dir) = ctx(true).await;
        messages::append(&ctx.db, "155", "agent", "answered", "text", "whatsapp")
            .await
            .unwrap();

        let out = GetDailySummaryTool
            .invoke(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(out.content.contains("3 messages today"));
        assert!(out.content.contains("1 in / 1 out"), "got: {}", out.content);
    }
}
