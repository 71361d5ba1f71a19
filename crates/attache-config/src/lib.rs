// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Attache messaging representative.
//!
//! Layered loading (defaults -> system TOML -> user TOML -> local TOML ->
//! `ATTACHE_*` env), strict unknown-field rejection, and semantic validation.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::AttacheConfig;
pub use validation::validate_config;
