// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Attache configuration system.

use attache_config::{load_config_from_str, validate_config};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_attache_config() {
    let toml = r#"
[agent]
name = "desk"
log_level = "debug"
session_name = "desk-main"

[owner]
address = "15551234567"
alternate_ids = ["15551234567:17@device"]

[llm]
api_key = "sk-primary"
api_keys = ["sk-second", "sk-third"]
model = "claude-sonnet-4-20250514"
min_spacing_ms = 1500
max_attempts = 10

[storage]
database_path = "/tmp/desk.db"
wal_mode = false

[telegram]
bot_token = "123:ABC"
owner_chat_id = 987654

[pipeline]
debounce_ms = 5000
max_buffer = 10
workers = 2
conversation_timeout_ms = 600000

[admin]
enabled = true
host = "0.0.0.0"
port = 8080
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "desk");
    assert_eq!(config.agent.session_name, "desk-main");
    assert_eq!(config.owner.address.as_deref(), Some("15551234567"));
    assert_eq!(config.owner.alternate_ids.len(), 1);
    assert_eq!(config.llm.min_spacing_ms, 1500);
    assert_eq!(config.llm.max_attempts, 10);
    assert_eq!(config.storage.database_path, "/tmp/desk.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.telegram.owner_chat_id, Some(987654));
    assert_eq!(config.pipeline.debounce_ms, 5000);
    assert_eq!(config.pipeline.max_buffer, 10);
    assert_eq!(config.pipeline.workers, 2);
    assert_eq!(config.admin.port, 8080);
}

/// Empty TOML yields compiled defaults everywhere.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.agent.name, "attache");
    assert_eq!(config.llm.min_spacing_ms, 3000);
    assert_eq!(config.llm.retry_delay_ms, 2000);
    assert_eq!(config.llm.max_attempts, 50);
    assert_eq!(config.llm.request_timeout_secs, 30);
    assert_eq!(config.pipeline.debounce_ms, 7000);
    assert_eq!(config.pipeline.max_buffer, 20);
    assert_eq!(config.pipeline.workers, 4);
    assert_eq!(config.pipeline.min_workers, 1);
    assert_eq!(config.pipeline.max_workers, 16);
    assert_eq!(config.pipeline.conversation_timeout_ms, 20 * 60 * 1000);
    assert_eq!(config.pipeline.lease_timeout_secs, 600);
    assert_eq!(config.storage.database_path, "attache.db");
    assert!(config.storage.wal_mode);
    assert!(config.telegram.bot_token.is_none());
}

/// Unknown field in a section is rejected by deny_unknown_fields.
#[test]
fn unknown_field_produces_error() {
    let toml = r#"
[llm]
api_kye = "oops"
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("api_kye"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// The key pool merges the primary key, the list, and comma-separated entries.
#[test]
fn key_pool_collects_all_forms() {
    let toml = r#"
[llm]
api_key = "sk-primary"
api_keys = ["sk-a, sk-b", "sk-c", "  "]
"#;
    let config = load_config_from_str(toml).unwrap();
    assert_eq!(
        config.llm.key_pool(),
        vec!["sk-primary", "sk-a", "sk-b", "sk-c"]
    );
}

/// A config with no credentials fails validation with a pointed message.
#[test]
fn validation_requires_at_least_one_key() {
    let config = load_config_from_str("").unwrap();
    let err = validate_config(&config).expect_err("keyless config must fail");
    assert!(err.to_string().contains("API keys"));
}

/// Full valid config passes validation.
#[test]
fn validation_accepts_complete_config() {
    let toml = r#"
[owner]
address = "15551234567"

[llm]
api_key = "sk-test"
"#;
    let config = load_config_from_str(toml).unwrap();
    assert!(validate_config(&config).is_ok());
}
