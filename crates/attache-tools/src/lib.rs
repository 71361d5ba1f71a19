// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry for the LLM-visible tool surface.
//!
//! Tools are fixed-name variants registered in a table keyed by name;
//! executing one is a single table lookup. Owner-gated tools refuse
//! non-owner invocations, and every outcome is folded into a
//! `{"result": ...}` or `{"error": ...}` JSON object so tool failures feed
//! back to the model instead of aborting the reply loop.

pub mod builtin;
pub mod side;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use attache_core::{types::RuntimeStats, AttacheError};
use attache_storage::Database;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::side::SideApi;

/// Output from a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The content returned by the tool (text output, JSON, etc.).
    pub content: String,
    /// Whether the tool invocation resulted in an error.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Everything a tool may touch during one invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub db: Arc<Database>,
    /// Normalized address of the contact whose batch is being processed.
    pub contact_phone: String,
    pub is_owner: bool,
    pub stats: Arc<RuntimeStats>,
    /// Calendar and web side tools (opaque external collaborators).
    pub side: Arc<dyn SideApi>,
}

/// Unified trait for all tools.
///
/// Every tool provides a name, description, JSON Schema for its parameters,
/// and an async `invoke`. The reply loop calls `invoke` with the parsed JSON
/// input from the model's tool call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's unique name (used for lookup and API serialization).
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// Whether only the owner may invoke this tool.
    fn owner_only(&self) -> bool {
        false
    }

    /// JSON Schema describing the tool's input parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Invokes the tool with the given JSON input.
    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError>;
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool. The tool is indexed by its `name()`.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns (name, description) pairs for all registered tools.
    pub fn list(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .tools
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }

    /// Returns provider-format tool definitions for all registered tools.
    ///
    /// Owner-gated tools are omitted for non-owners so the model never sees
    /// tools it cannot call.
    pub fn tool_definitions(&self, is_owner: bool) -> Vec<serde_json::Value> {
        let mut defs: Vec<serde_json::Value> = self
            .tools
            .values()
            .filter(|t| is_owner || !t.owner_only())
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.parameters_schema(),
                })
            })
            .collect();
        defs.sort_by(|a, b| {
            a["name"]
                .as_str()
                .unwrap_or("")
                .cmp(b["name"].as_str().unwrap_or(""))
        });
        defs
    }

    /// Executes a tool by name, folding every outcome into a
    /// `{"result": ...}` or `{"error": ...}` object.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> serde_json::Value {
        let Some(tool) = self.get(name) else {
            return serde_json::json!({"error": format!("unknown tool: {name}")});
        };
        if tool.owner_only() && !ctx.is_owner {
            return serde_json::json!({
                "error": format!("tool '{name}' is restricted to the owner")
            });
        }
        debug!(tool = name, "executing tool");
        match tool.invoke(args, ctx).await {
            Ok(output) if output.is_error => serde_json::json!({"error": output.content}),
            Ok(output) => serde_json::json!({"result": output.content}),
            Err(e) => serde_json::json!({"error": e.to_string()}),
        }
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
