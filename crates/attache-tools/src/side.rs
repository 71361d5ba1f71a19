// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Calendar and web side tools, treated as opaque callable functions.
//!
//! The actual integrations live outside the core; the pipeline only needs a
//! callable seam. The default implementation reports the capability as
//! unconfigured, which reaches the model as a tool error it can relay.

use async_trait::async_trait;
use attache_core::AttacheError;

/// External calendar and web capabilities invoked by the built-in tools.
#[async_trait]
pub trait SideApi: Send + Sync {
    async fn check_schedule(&self, day: &str) -> Result<String, AttacheError>;
    async fn check_availability(&self, window: &str) -> Result<String, AttacheError>;
    async fn schedule_meeting(
        &self,
        title: &str,
        start: &str,
        duration_minutes: i64,
        attendee: &str,
    ) -> Result<String, AttacheError>;
    async fn browse_url(&self, url: &str) -> Result<String, AttacheError>;
    async fn search_web(&self, query: &str) -> Result<String, AttacheError>;
}

/// Placeholder used when no calendar/web backend is wired in.
pub struct UnconfiguredSideApi;

fn unconfigured(name: &str) -> AttacheError {
    AttacheError::Tool {
        name: name.to_string(),
        message: "no backend configured for this capability".to_string(),
    }
}

#[async_trait]
impl SideApi for UnconfiguredSideApi {
    async fn check_schedule(&self, _day: &str) -> Result<String, AttacheError> {
        Err(unconfigured("check_schedule"))
    }

    async fn check_availability(&self, _window: &str) -> Result<String, AttacheError> {
        Err(unconfigured("check_availability"))
    }

    async fn schedule_meeting(
        &self,
        _title: &str,
        _start: &str,
        _duration_minutes: i64,
        _attendee: &str,
    ) -> Result<String, AttacheError> {
        Err(unconfigured("schedule_meeting"))
    }

    async fn browse_url(&self, _url: &str) -> Result<String, AttacheError> {
        Err(unconfigured("browse_url"))
    }

    async fn search_web(&self, _query: &str) -> Result<String, AttacheError> {
        Err(unconfigured("search_web"))
    }
}
