// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar tools delegating to the opaque side API.

use async_trait::async_trait;
use attache_core::AttacheError;

use crate::{Tool, ToolContext, ToolOutput};

pub struct CheckScheduleTool;

#[async_trait]
impl Tool for CheckScheduleTool {
    fn name(&self) -> &str {
        "check_schedule"
    }

    fn description(&self) -> &str {
        "Look up the owner's calendar for a given day"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "day": {
                    "type": "string",
                    "description": "Day to check, e.g. \"today\", \"tomorrow\", or an ISO date"
                }
            },
            "required": ["day"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let day = input["day"].as_str().unwrap_or("today");
        match ctx.side.check_schedule(day).await {
            Ok(result) => Ok(ToolOutput::ok(result)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}

pub struct CheckAvailabilityTool;

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn name(&self) -> &str {
        "check_availability"
    }

    fn description(&self) -> &str {
        "Check whether the owner is free in a given time window"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "window": {
                    "type": "string",
                    "description": "Time window to check, e.g. \"tomorrow 14:00-15:00\""
                }
            },
            "required": ["window"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let Some(window) = input["window"].as_str() else {
            return Ok(ToolOutput::error("window is required"));
        };
        match ctx.side.check_availability(window).await {
            Ok(result) => Ok(ToolOutput::ok(result)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}

pub struct ScheduleMeetingTool;

#[async_trait]
impl Tool for ScheduleMeetingTool {
    fn name(&self) -> &str {
        "schedule_meeting"
    }

    fn description(&self) -> &str {
        "Create a calendar entry on the owner's calendar"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "start": { "type": "string", "description": "ISO start time" },
                "duration_minutes": { "type": "integer", "minimum": 5 },
                "attendee": { "type": "string", "description": "Who the meeting is with" }
            },
            "required": ["title", "start"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let (Some(title), Some(start)) = (input["title"].as_str(), input["start"].as_str())
        else {
            return Ok(ToolOutput::error("title and start are required"));
        };
        let duration = input["duration_minutes"].as_i64().unwrap_or(30);
        let attendee = input["attendee"].as_str().unwrap_or(&ctx.contact_phone);
        match ctx.side.schedule_meeting(title, start, duration, attendee).await {
            Ok(result) => Ok(ToolOutput::ok(result)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
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
    async fn unconfigured_backend_surfaces_as_tool_error() {
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

        let out = CheckScheduleTool
            .invoke(serde_json::json!({"day": "today"}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("no backend configured"));

        let _ = dir;
    }
}
