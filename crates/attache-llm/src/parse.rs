// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of JSON-returning model responses.
//!
//! Models wrap JSON in markdown fences often enough that the fences are
//! stripped before parsing. Parse failures return typed fallbacks rather
//! than errors so one malformed response cannot wedge the pipeline.

use attache_core::{ConversationAnalysis, ProfileUpdate};
use tracing::warn;

/// Strips a single leading/trailing markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses an `analyze_conversation` response, falling back to
/// `{urgency: 5, status: "active"}` on malformed output.
pub fn parse_analysis(text: &str) -> ConversationAnalysis {
    let cleaned = strip_code_fences(text);
    match serde_json::from_str::<ConversationAnalysis>(cleaned) {
        Ok(mut analysis) => {
            analysis.urgency = analysis.urgency.clamp(1, 10);
            analysis
        }
        Err(e) => {
            warn!(error = %e, "unparseable analysis response, using fallback");
            ConversationAnalysis::fallback()
        }
    }
}

/// Parses an `update_profile` response. The literal `null` (or anything
/// unparseable) means "no update".
pub fn parse_profile_update(text: &str) -> Option<ProfileUpdate> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("null") {
        return None;
    }
    match serde_json::from_str::<ProfileUpdate>(cleaned) {
        Ok(update) => {
            if update.summary.is_none() && update.trust_level.is_none() {
                None
            } else {
                Some(ProfileUpdate {
                    trust_level: update.trust_level.map(|t| t.clamp(0, 10)),
                    ..update
                })
            }
        }
        Err(e) => {
            warn!(error = %e, "unparseable profile update, skipping");
            None
        }
    }
}
