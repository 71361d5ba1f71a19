// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools exposed to the model.

pub mod contact;
pub mod messages;
pub mod schedule;
pub mod status;
pub mod time;
pub mod web;

use std::sync::Arc;

use crate::ToolRegistry;

/// Registers the full built-in tool surface.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Arc::new(contact::UpdateContactInfoTool));
    registry.register(Arc::new(messages::SearchMessagesTool));
    registry.register(Arc::new(messages::SearchAllConversationsTool));
    registry.register(Arc::new(messages::GetRecentConversationsTool));
    registry.register(Arc::new(messages::GetDailySummaryTool));
    registry.register(Arc::new(status::GetSystemStatusTool));
    registry.register(Arc::new(status::GetAnalyticsTool));
    registry.register(Arc::new(time::GetCurrentTimeTool));
    registry.register(Arc::new(schedule::CheckScheduleTool));
    registry.register(Arc::new(schedule::CheckAvailabilityTool));
    registry.register(Arc::new(schedule::ScheduleMeetingTool));
    registry.register(Arc::new(web::BrowseUrlTool));
    registry.register(Arc::new(web::SearchWebTool));
}
