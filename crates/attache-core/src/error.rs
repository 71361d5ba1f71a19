// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Attache messaging representative.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Attache crates.
///
/// The reply pipeline treats errors as typed values: the LLM gateway's
/// retry/rotation logic and the worker's re-enqueue decision are pure
/// functions of the variant, never of error message text.
#[derive(Debug, Error)]
pub enum AttacheError {
    /// Configuration errors (invalid TOML, missing required fields, bad key list).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transient transport errors (send failure, socket drop, reconnectable).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Fatal transport lifecycle: another client took over the session or the
    /// stored session is unusable. The process must exit and be restarted.
    #[error("session conflict: {0}")]
    SessionConflict(String),

    /// The model API rejected the call with a rate limit; the key must cool
    /// down for `retry_after` before it is usable again.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The model API is overloaded; the key is not at fault.
    #[error("model service overloaded")]
    Overloaded,

    /// The credential was rejected outright and must not be retried.
    #[error("invalid model credential: {0}")]
    InvalidCredential(String),

    /// Every key in the pool is cooling down or dead.
    #[error("all model keys exhausted")]
    AllKeysExhausted,

    /// A tool invocation failed; fed back to the model as an error result.
    #[error("tool '{name}' failed: {message}")]
    Tool { name: String, message: String },

    /// A model response could not be parsed into the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// A call exceeded its wall-clock budget.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// An inbound payload could not be decrypted for this sender.
    #[error("undecryptable payload from {sender}")]
    Decryption { sender: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AttacheError {
    /// True for gateway errors that mean "the batch should be re-enqueued
    /// with delayed visibility" rather than counted as a processing failure.
    pub fn is_capacity_exhaustion(&self) -> bool {
        matches!(
            self,
            AttacheError::AllKeysExhausted | AttacheError::RateLimited { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = AttacheError::Tool {
            name: "browse_url".into(),
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "tool 'browse_url' failed: connection refused");

        let err = AttacheError::Decryption {
            sender: "15551234567".into(),
        };
        assert!(err.to_string().contains("15551234567"));
    }

    #[test]
    fn capacity_exhaustion_classification() {
        assert!(AttacheError::AllKeysExhausted.is_capacity_exhaustion());
        assert!(AttacheError::RateLimited {
            retry_after: Duration::from_secs(60)
        }
        .is_capacity_exhaustion());
        assert!(!AttacheError::Overloaded.is_capacity_exhaustion());
        assert!(!AttacheError::Internal("x".into()).is_capacity_exhaustion());
    }
}
