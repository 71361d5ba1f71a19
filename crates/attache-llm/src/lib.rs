// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM gateway for the Attache messaging representative.
//!
//! This crate owns all outbound model traffic: a single-consumer FIFO with
//! global pacing, credential rotation with per-key cooldowns, deterministic
//! prompt construction for the four gateway operations, and tolerant parsing
//! of JSON-returning responses.

pub mod client;
pub mod gateway;
pub mod keypool;
pub mod parse;
pub mod prompt;
pub mod types;

pub use client::HttpModelClient;
pub use gateway::{GatewayConfig, LlmGateway};
pub use keypool::KeyPool;
pub use prompt::{PromptOwner, PromptPersona, ReplyPrompt, ReportMeta};
