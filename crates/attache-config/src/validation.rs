// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes. Collects every violation instead of failing fast.

use attache_core::AttacheError;

use crate::model::AttacheConfig;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &AttacheConfig) -> Result<(), AttacheError> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push("storage.database_path must not be empty".to_string());
    }

    if let Some(owner) = &config.owner.address {
        if !owner.bytes().all(|b| b.is_ascii_digit()) {
            errors.push(format!(
                "owner.address must be digits-only phone form, got `{owner}`"
            ));
        }
    }

    if config.llm.key_pool().is_empty() {
        errors.push(
            "no model API keys configured: set llm.api_key, llm.api_keys, or \
             ATTACHE_LLM_API_KEY_1..N"
                .to_string(),
        );
    }

    if config.pipeline.min_workers == 0 {
        errors.push("pipeline.min_workers must be at least 1".to_string());
    }
    if config.pipeline.min_workers > config.pipeline.max_workers {
        errors.push(format!(
            "pipeline.min_workers ({}) exceeds pipeline.max_workers ({})",
            config.pipeline.min_workers, config.pipeline.max_workers
        ));
    }
    if config.pipeline.workers < config.pipeline.min_workers
        || config.pipeline.workers > config.pipeline.max_workers
    {
        errors.push(format!(
            "pipeline.workers ({}) must lie within [min_workers, max_workers]",
            config.pipeline.workers
        ));
    }
    if config.pipeline.max_buffer == 0 {
        errors.push("pipeline.max_buffer must be at least 1".to_string());
    }

    if !(0.0..=1.0).contains(&config.pipeline.error_rate_threshold) {
        errors.push(format!(
            "pipeline.error_rate_threshold must be within [0, 1], got {}",
            config.pipeline.error_rate_threshold
        ));
    }

    if config.telegram.bot_token.as_deref() == Some("") {
        errors.push("telegram.bot_token must not be an empty string".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AttacheError::Config(errors.join("; ")))
    }
}
