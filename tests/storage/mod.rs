//! Shared storage contract tests.
//!
//! Tests the EventStore, PositionStore, RunLock and StatementExecutor
//! interfaces against every implementation. Each backend test file runs the
//! `run_*_tests!` macros against its own stores.

#![allow(dead_code)]

pub mod event_store_tests;
pub mod executor_tests;
pub mod position_store_tests;
pub mod run_lock_tests;
