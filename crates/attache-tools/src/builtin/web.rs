// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web tools delegating to the opaque side API.

use async_trait::async_trait;
use attache_core::AttacheError;

use crate::{Tool, ToolContext, ToolOutput};

pub struct BrowseUrlTool;

#[async_trait]
impl Tool for BrowseUrlTool {
    fn name(&self) -> &str {
        "browse_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http(s) URL" }
            },
            "required": ["url"]
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        let Some(url) = input["url"].as_str() else {
            return Ok(ToolOutput::error("url is required"));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(ToolOutput::error("only http(s) URLs are supported"));
        }
        match ctx.side.browse_url(url).await {
            Ok(result) => Ok(ToolOutput::ok(result)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}

pub struct SearchWebTool;

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Run a web search and return the top results"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
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
        match ctx.side.search_web(query).await {
            Ok(result) => Ok(ToolOutput::ok(result)),
            Err(e) => Ok(ToolOutput::error(e.to_string())),
        }
    }
}
