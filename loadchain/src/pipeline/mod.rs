//! Loader chain execution.
//!
//! This module provides:
//! - The runner driving the pitch and normal passes
//! - Completion handles for suspended loaders
//! - Cooperative cancellation
//! - Runner configuration

mod cancellation;
mod config;
mod normal;
mod pitch;
mod runner;
mod suspension;

#[cfg(test)]
mod integration_tests;

pub use cancellation::CancellationToken;
pub use config::RunnerConfig;
pub use runner::{LoaderRunner, RunOptions};
pub use suspension::Completer;
pub(crate) use suspension::SuspensionSlot;
