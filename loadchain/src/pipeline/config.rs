//! Runner configuration.

use crate::effects::HashFunction;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`LoaderRunner`](super::LoaderRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long a suspended loader may take to complete, in milliseconds.
    ///
    /// `None` waits indefinitely.
    #[serde(default)]
    pub completion_timeout_ms: Option<u64>,
    /// Whether to emit run and loader events to the event sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
    /// Hash function for `[hash]` tokens without an explicit type.
    #[serde(default)]
    pub hash_function: HashFunction,
}

fn default_emit_events() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            completion_timeout_ms: None,
            emit_events: default_emit_events(),
            hash_function: HashFunction::default(),
        }
    }
}

impl RunnerConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the completion timeout.
    #[must_use]
    pub fn with_completion_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.completion_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enables or disables event emission.
    #[must_use]
    pub fn with_events(mut self, enabled: bool) -> Self {
        self.emit_events = enabled;
        self
    }

    /// Sets the default hash function.
    #[must_use]
    pub fn with_hash_function(mut self, hash_function: HashFunction) -> Self {
        self.hash_function = hash_function;
        self
    }

    /// Gets the completion timeout as a Duration.
    #[must_use]
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_ms.map(Duration::from_millis)
    }
}
