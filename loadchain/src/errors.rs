//! Error types for the loadchain engine.
//!
//! Errors fall into three families: failures reported by a loader
//! ([`PipelineError`]), malformed loaders breaking the completion protocol
//! ([`ProtocolViolation`]) and unusable requests ([`ConfigurationError`]).
//! Every error is `Clone` so a single outcome can be handed to all coalesced
//! cache waiters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for loadchain operations.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// A loader failed while transforming or pitching.
    #[error("{0}")]
    Unit(#[from] PipelineError),

    /// A loader broke the completion protocol.
    #[error("{0}")]
    Protocol(#[from] ProtocolViolation),

    /// The request could not be executed as given.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The run was aborted before it finished.
    #[error("Run cancelled: {0}")]
    Cancelled(String),
}

impl LoaderError {
    /// Returns true if this error reports a malformed loader.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns the identifier of the loader responsible, if any.
    #[must_use]
    pub fn unit(&self) -> Option<&str> {
        match self {
            Self::Unit(err) => Some(&err.unit),
            Self::Protocol(violation) => Some(violation.unit()),
            Self::Configuration(ConfigurationError::InvalidOptions { unit, .. }) => Some(unit),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::Unit(err) => {
                map.insert("type".to_string(), serde_json::json!("UnitFailure"));
                map.insert("unit".to_string(), serde_json::json!(err.unit));
                map.insert("index".to_string(), serde_json::json!(err.index));
                map.insert("phase".to_string(), serde_json::json!(err.phase));
            }
            Self::Protocol(violation) => {
                map.insert("type".to_string(), serde_json::json!("ProtocolViolation"));
                map.insert("unit".to_string(), serde_json::json!(violation.unit()));
            }
            Self::Configuration(_) => {
                map.insert("type".to_string(), serde_json::json!("ConfigurationError"));
            }
            Self::Cancelled(reason) => {
                map.insert("type".to_string(), serde_json::json!("Cancelled"));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// The traversal pass a loader was invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Left-to-right pass that may short-circuit the chain.
    Pitch,
    /// Right-to-left pass composing transforms.
    Normal,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pitch => write!(f, "pitch"),
            Self::Normal => write!(f, "normal"),
        }
    }
}

/// Error raised when a loader fails.
///
/// Produced when a loader returns an error, completes its suspension with an
/// error, or emits an error through its context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Loader '{unit}' failed in {phase} phase: {message}")]
pub struct PipelineError {
    /// The phase the failure happened in.
    pub phase: Phase,
    /// Position of the loader in the chain.
    pub index: usize,
    /// Identifier of the failing loader.
    pub unit: String,
    /// The underlying error, including its cause chain.
    pub message: String,
}

impl PipelineError {
    /// Creates a new pipeline error.
    #[must_use]
    pub fn new(
        phase: Phase,
        index: usize,
        unit: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            index,
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Creates a pipeline error from a loader-reported cause.
    #[must_use]
    pub fn from_cause(phase: Phase, index: usize, unit: impl Into<String>, cause: &anyhow::Error) -> Self {
        Self::new(phase, index, unit, format!("{cause:#}"))
    }
}

/// A loader broke the completion protocol.
///
/// These indicate a malformed loader rather than bad input and are never
/// reported as a [`PipelineError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Suspension was requested more than once in one invocation.
    #[error("Loader '{unit}' requested suspension more than once")]
    SuspendedTwice {
        /// The loader identifier.
        unit: String,
    },

    /// The completion handle fired more than once.
    #[error("Loader '{unit}' completed its suspension more than once")]
    CompletedTwice {
        /// The loader identifier.
        unit: String,
    },

    /// The loader returned a value after requesting suspension.
    #[error("Loader '{unit}' returned a value after requesting suspension")]
    ReturnedWhileSuspended {
        /// The loader identifier.
        unit: String,
    },

    /// The loader reported suspension without requesting a completion handle.
    #[error("Loader '{unit}' reported suspension without requesting a completion handle")]
    SuspendedWithoutHandle {
        /// The loader identifier.
        unit: String,
    },

    /// Every completion handle was dropped before completing.
    #[error("Loader '{unit}' dropped its completion handle without completing")]
    Abandoned {
        /// The loader identifier.
        unit: String,
    },

    /// The loader did not complete within the configured timeout.
    #[error("Loader '{unit}' did not complete within {timeout_ms}ms")]
    Timeout {
        /// The loader identifier.
        unit: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// A transform completed without producing a value.
    #[error("Loader '{unit}' completed its transform without a value")]
    MissingOutput {
        /// The loader identifier.
        unit: String,
    },
}

impl ProtocolViolation {
    /// Returns the identifier of the offending loader.
    #[must_use]
    pub fn unit(&self) -> &str {
        match self {
            Self::SuspendedTwice { unit }
            | Self::CompletedTwice { unit }
            | Self::ReturnedWhileSuspended { unit }
            | Self::SuspendedWithoutHandle { unit }
            | Self::Abandoned { unit }
            | Self::Timeout { unit, .. }
            | Self::MissingOutput { unit } => unit,
        }
    }
}

/// The request handed to the engine is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The resource identifier is empty.
    #[error("Resource identifier cannot be empty")]
    EmptyResource,

    /// A chain entry has an empty loader identifier.
    #[error("Chain entry {index} has an empty loader identifier")]
    EmptyIdentifier {
        /// Position of the entry in the chain.
        index: usize,
    },

    /// A loader's options could not be interpreted.
    #[error("Invalid options for loader '{unit}': {message}")]
    InvalidOptions {
        /// The loader identifier.
        unit: String,
        /// What was wrong with the options.
        message: String,
    },
}
