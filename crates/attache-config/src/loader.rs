// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./attache.toml` > `~/.config/attache/attache.toml`
//! > `/etc/attache/attache.toml` with environment variable overrides via the
//! `ATTACHE_` prefix. Numbered credential variables (`ATTACHE_LLM_API_KEY_1`,
//! `ATTACHE_LLM_API_KEY_2`, ...) are collected into the key pool after the
//! figment merge.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::AttacheConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/attache/attache.toml` (system-wide)
/// 3. `~/.config/attache/attache.toml` (user XDG config)
/// 4. `./attache.toml` (local directory)
/// 5. `ATTACHE_*` environment variables
pub fn load_config() -> Result<AttacheConfig, figment::Error> {
    let config: AttacheConfig = Figment::new()
        .merge(Serialized::defaults(AttacheConfig::default()))
        .merge(Toml::file("/etc/attache/attache.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("attache/attache.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("attache.toml"))
        .merge(env_provider())
        .extract()?;
    Ok(apply_numbered_keys(config, collect_numbered_env_keys()))
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<AttacheConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AttacheConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AttacheConfig, figment::Error> {
    let config: AttacheConfig = Figment::new()
        .merge(Serialized::defaults(AttacheConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    Ok(apply_numbered_keys(config, collect_numbered_env_keys()))
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ATTACHE_TELEGRAM_BOT_TOKEN` must map to
/// `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("ATTACHE_")
        .filter(|key| !is_numbered_key(key.as_str()))
        .map(|key| {
            // `key` is the lowercased env var name with prefix stripped.
            // Example: ATTACHE_LLM_MIN_SPACING_MS -> "llm_min_spacing_ms"
            let key_str = key.as_str();
            let mapped = key_str
                .replacen("agent_", "agent.", 1)
                .replacen("owner_", "owner.", 1)
                .replacen("llm_", "llm.", 1)
                .replacen("storage_", "storage.", 1)
                .replacen("telegram_", "telegram.", 1)
                .replacen("pipeline_", "pipeline.", 1)
                .replacen("admin_", "admin.", 1);
            mapped.into()
        })
}

/// True for `llm_api_key_N` style names (prefix already stripped, lowercased).
fn is_numbered_key(stripped: &str) -> bool {
    stripped
        .strip_prefix("llm_api_key_")
        .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
}

/// Reads `ATTACHE_LLM_API_KEY_1..N` from the environment, stopping at the
/// first gap so the pool order is deterministic.
fn collect_numbered_env_keys() -> Vec<String> {
    let mut keys = Vec::new();
    for n in 1.. {
        match std::env::var(format!("ATTACHE_LLM_API_KEY_{n}")) {
            Ok(value) if !value.trim().is_empty() => keys.push(value.trim().to_string()),
            _ => break,
        }
    }
    keys
}

/// Appends numbered env keys to the configured key list.
fn apply_numbered_keys(mut config: AttacheConfig, numbered: Vec<String>) -> AttacheConfig {
    config.llm.api_keys.extend(numbered);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_key_detection() {
        assert!(is_numbered_key("llm_api_key_1"));
        assert!(is_numbered_key("llm_api_key_12"));
        assert!(!is_numbered_key("llm_api_key"));
        assert!(!is_numbered_key("llm_api_keys"));
        assert!(!is_numbered_key("llm_api_key_x"));
    }

    #[test]
    fn apply_numbered_keys_appends_in_order() {
        let config = AttacheConfig::default();
        let config = apply_numbered_keys(
            config,
            vec!["key-one".to_string(), "key-two".to_string()],
        );
        assert_eq!(config.llm.api_keys, vec!["key-one", "key-two"]);
    }
}
