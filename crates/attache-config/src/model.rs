// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Attache messaging representative.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Attache configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttacheConfig {
    /// Agent identity and runtime settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Owner identity (canonical address and linked alternate ids).
    #[serde(default)]
    pub owner: OwnerConfig,

    /// LLM gateway settings (credentials, model, pacing).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram secondary-transport settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Intake/queue/worker pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Admin HTTP API settings.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Agent identity and runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Name of the singleton session-lock row gating transport connection.
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            session_name: default_session_name(),
        }
    }
}

fn default_agent_name() -> String {
    "attache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_session_name() -> String {
    "attache-main".to_string()
}

/// Owner identity configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OwnerConfig {
    /// Canonical owner address in digits-only phone form. `None` disables
    /// owner-gated tools and owner error surfacing.
    #[serde(default)]
    pub address: Option<String>,

    /// Alternate transport identifiers (e.g. a desktop-linked id) that
    /// intake normalizes back to the canonical address.
    #[serde(default)]
    pub alternate_ids: Vec<String>,
}

/// LLM gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Primary API key. Combined with `api_keys` into the rotation pool.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Additional API keys for rotation (also accepts a comma-separated
    /// string through the env override path).
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Model identifier for all gateway operations.
    #[serde(default = "default_model")]
    pub model: String,

    /// Minimum wall-clock spacing between consecutive model calls.
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// Pause after a rate-limited attempt before trying the next key.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Attempts across the pool before reporting exhaustion.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget for one model HTTP call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum tokens generated per reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_keys: Vec::new(),
            model: default_model(),
            min_spacing_ms: default_min_spacing_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Collects the rotation pool in declaration order: primary key first,
    /// then the list entries. Blank entries are dropped, duplicates kept
    /// (a duplicated key simply gets a doubled rotation share).
    pub fn key_pool(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(primary) = &self.api_key {
            if !primary.trim().is_empty() {
                keys.push(primary.trim().to_string());
            }
        }
        for key in &self.api_keys {
            // The env override path delivers comma-separated lists as one
            // element; split here so both forms land in the same pool.
            for part in key.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    keys.push(part.to_string());
                }
            }
        }
        keys
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_min_spacing_ms() -> u64 {
    3_000
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1_024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "attache.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Telegram secondary-transport configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Telegram Bot API token. `None` disables the Telegram transport.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat id where session reports and error notes are delivered.
    #[serde(default)]
    pub owner_chat_id: Option<i64>,
}

/// Intake/queue/worker pipeline tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Quiet window before a sender's buffered texts flush as one batch.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Buffer size that forces an immediate flush regardless of the timer.
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,

    /// Initial worker count.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Lower bound for the concurrency controller.
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    /// Upper bound for the concurrency controller.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Queue depth above which the controller considers scaling up.
    #[serde(default = "default_high_watermark")]
    pub high_watermark: i64,

    /// Queue depth below which the controller considers scaling down.
    #[serde(default = "default_low_watermark")]
    pub low_watermark: i64,

    /// Error rate at or above which scale-up is suppressed.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Seconds between controller samples.
    #[serde(default = "default_autoscale_interval_secs")]
    pub autoscale_interval_secs: u64,

    /// Silence interval after which an active conversation completes.
    #[serde(default = "default_conversation_timeout_ms")]
    pub conversation_timeout_ms: u64,

    /// Age after which a `processing` lease is presumed dead.
    #[serde(default = "default_lease_timeout_secs")]
    pub lease_timeout_secs: u64,

    /// Retention for settled (completed/failed) queue rows.
    #[serde(default = "default_queue_ttl_secs")]
    pub queue_ttl_secs: u64,

    /// Processing attempts per queue item before it is marked failed.
    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: i64,

    /// Grace window for in-flight workers during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_buffer: default_max_buffer(),
            workers: default_workers(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            error_rate_threshold: default_error_rate_threshold(),
            autoscale_interval_secs: default_autoscale_interval_secs(),
            conversation_timeout_ms: default_conversation_timeout_ms(),
            lease_timeout_secs: default_lease_timeout_secs(),
            queue_ttl_secs: default_queue_ttl_secs(),
            queue_max_retries: default_queue_max_retries(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    7_000
}

fn default_max_buffer() -> usize {
    20
}

fn default_workers() -> usize {
    4
}

fn default_min_workers() -> usize {
    1
}

fn default_max_workers() -> usize {
    16
}

fn default_high_watermark() -> i64 {
    8
}

fn default_low_watermark() -> i64 {
    2
}

fn default_error_rate_threshold() -> f64 {
    0.3
}

fn default_autoscale_interval_secs() -> u64 {
    30
}

fn default_conversation_timeout_ms() -> u64 {
    20 * 60 * 1_000
}

fn default_lease_timeout_secs() -> u64 {
    600
}

fn default_queue_ttl_secs() -> u64 {
    86_400
}

fn default_queue_max_retries() -> i64 {
    3
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

/// Admin HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    /// Serve the admin API at all.
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,

    /// Address to bind the admin server to.
    #[serde(default = "default_admin_host")]
    pub host: String,

    /// Port to bind the admin server to.
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

fn default_admin_enabled() -> bool {
    true
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    3000
}
