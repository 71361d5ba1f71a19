// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external seams.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod model;
pub mod notifier;
pub mod transport;

pub use model::{ModelClient, ModelMessage, ModelRequest, ModelResponse};
pub use notifier::Notifier;
pub use transport::{TextSender, TransportAdapter};
