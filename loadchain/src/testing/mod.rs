//! Testing utilities for loader chains.
//!
//! This module provides:
//! - Mock loaders and a shared call log
//! - Fixture loaders, requests and runners
//! - Test assertions for results and errors

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_cancelled, assert_emitted, assert_output_text, assert_protocol_violation,
    assert_unit_failure,
};
pub use fixtures::{async_upper, doubler, quiet_runner, quiet_runner_with, request, run_all, upper};
pub use mocks::{CallLog, FailingLoader, HoldingLoader, RecordingLoader, SuspendingLoader};
