// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod contacts;
pub mod conversations;
pub mod credentials;
pub mod messages;
pub mod metrics;
pub mod profiles;
pub mod queue;
pub mod report_queue;
pub mod session_lock;
