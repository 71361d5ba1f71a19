// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities: mock model client, capture transport, and the
//! full-pipeline harness used by the end-to-end suite.

pub mod harness;
pub mod mock_model;
pub mod mock_transport;

pub use harness::{ProcessOutcome, TestHarness, TestHarnessBuilder};
pub use mock_model::MockModelClient;
pub use mock_transport::CaptureTransport;
