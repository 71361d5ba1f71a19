// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message intake and reply pipeline.
//!
//! Inbound events flow: intake filter -> contact upsert -> debounce buffer
//! -> persistent queue -> worker pool -> reply engine (LLM + tools) ->
//! transport send -> message log. Alongside: the session tracker watches
//! silence and feeds the report worker, and the concurrency controller
//! sizes the worker pool.

pub mod autoscale;
pub mod debounce;
pub mod identity;
pub mod intake;
pub mod lock;
pub mod notify;
pub mod reply;
pub mod report_worker;
pub mod session_tracker;
pub mod shutdown;
pub mod worker;

pub use autoscale::ConcurrencyController;
pub use debounce::DebounceBuffer;
pub use intake::IntakeService;
pub use lock::SessionLock;
pub use notify::{NotifyTarget, OwnerNotifier};
pub use reply::{ReplyEngine, END_SESSION_SENTINEL};
pub use report_worker::ReportWorker;
pub use session_tracker::SessionTracker;
pub use worker::WorkerPool;
