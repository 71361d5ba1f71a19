// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `update_contact_info`: the only path by which a contact's identity is
//! confirmed.

use async_trait::async_trait;
use attache_core::AttacheError;
use attache_storage::queries::contacts;

use crate::{Tool, ToolContext, ToolOutput};

pub struct UpdateContactInfoTool;

#[async_trait]
impl Tool for UpdateContactInfoTool {
    fn name(&self) -> &str {
        "update_contact_info"
    }

    fn description(&self) -> &str {
        "Record the sender's confirmed name and/or update their profile summary and trust level"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The sender's confirmed name"
                },
                "summary": {
                    "type": "string",
                    "description": "Updated one-paragraph profile summary"
                },
                "trust_level": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 10,
                    "description": "Updated trust level"
                },
                "phone": {
                    "type": "string",
                    "description": "Target contact address (owner only; defaults to the current sender)"
                }
            }
        })
    }

    async fn invoke(
        &self,
        input: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, AttacheError> {
        // Only the owner may redirect the update to another contact.
        let target = match input["phone"].as_str() {
            Some(phone) if ctx.is_owner => phone.to_string(),
            _ => ctx.contact_phone.clone(),
        };

        let name = input["name"].as_str().map(str::trim).filter(|s| !s.is_empty());
        let summary = input["summary"].as_str().map(str::trim).filter(|s| !s.is_empty());
        let trust_level = input["trust_level"].as_i64().map(|t| t.clamp(0, 10));

        if name.is_none() && summary.is_none() && trust_level.is_none() {
            return Ok(ToolOutput::error("nothing to update: provide name, summary, or trust_level"));
        }

        if contacts::get(&ctx.db, &target).await?.is_none() {
            return Ok(ToolOutput::error(format!("unknown contact: {target}")));
        }

        if let Some(name) = name {
            contacts::confirm_name(&ctx.db, &target, name).await?;
        }
        if summary.is_some() || trust_level.is_some() {
            contacts::apply_profile_update(&ctx.db, &target, summary, trust_level).await?;
        }

        Ok(ToolOutput::ok(format!("contact {target} updated")))
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
        contacts::upsert_on_inbound(&db, "155", Some("Alice"), "whatsapp")
            .await
            .unwrap();
        contacts::upsert_on_inbound(&db, "166", None, "whatsapp")
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
    async fn confirming_a_name_marks_verified() {
        let (ctx, _dir) = ctx(false).await;

        let out = UpdateContactInfoTool
            .invoke(serde_json::json!({"name": "Alice Martin"}), &ctx)
            .await
            .unwrap();
        assert!(!out.is_error);

        let contact = contacts::get(&ctx.db, "155").await.unwrap().unwrap();
        assert!(contact.verified);
        assert_eq!(contact.confirmed_name.as_deref(), Some("Alice Martin"));
    }

    #[tokio::test]
    async fn non_owner_cannot_target_another_contact() {
        let (ctx, _dir) = ctx(false).await;

        UpdateContactInfoTool
            .invoke(
                serde_json::json!({"phone": "166", "name": "Sneaky"}),
                &ctx,
            )
            .await
            .unwrap();

        // The update landed on the sender, not on 166.
        let other = contacts::get(&ctx.db, "166").await.unwrap().unwrap();
        assert!(!other.verified);
        let own = contacts::get(&ctx.db, "155").await.unwrap().unwrap();
        assert_eq!(own.confirmed_name.as_deref(), Some("Sneaky"));
    }

    #[tokio::test]
    async fn owner_can_target_another_contact() {
        let (ctx, _dir) = ctx(true).await;

        UpdateContactInfoTool
            .invoke(
                serde_json::json!({"phone": "166", "trust_level": 99}),
                &ctx,
            )
            .await
            .unwrap();

        let other = contacts::get(&ctx.db, "166").await.unwrap().unwrap();
        assert_eq!(other.trust_level, 10, "trust level is clamped to 10");
    }

    #[tokio::test]
    async fn empty_update_is_an_error_result() {
        let (ctx, _dir) = ctx(false).await;
        let out = UpdateContactInfoTool
            .invoke(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(out.is_error);
    }
}
