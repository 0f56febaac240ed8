//! # Loadchain
//!
//! A loader-chain execution engine.
//!
//! A resource is run through an ordered chain of loaders in two passes:
//!
//! - **Pitch**: left to right. Any loader may short-circuit the chain by
//!   supplying a value, which skips itself and everything to its right.
//! - **Normal**: right to left. Each loader transforms the output of its right
//!   neighbour; the leftmost loader produces the final output.
//!
//! Loaders may finish immediately or suspend and complete later through a
//! [`Completer`](pipeline::Completer). Side effects (emitted files,
//! diagnostics, dependencies) are collected per run, and [`LoaderCache`]
//! coalesces identical concurrent requests into a single run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loadchain::prelude::*;
//!
//! let request = PipelineRequest::new("src/app.txt", "ab")
//!     .with_unit("double", Arc::new(FnLoader::map_text(|s| s.repeat(2))))
//!     .with_unit("upper", Arc::new(FnLoader::map_text(str::to_uppercase)));
//!
//! let result = LoaderRunner::new().run(request).await?;
//! assert_eq!(result.output_text(), "ABAB");
//! ```
//!
//! [`LoaderCache`]: cache::LoaderCache

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cache;
pub mod context;
pub mod core;
pub mod effects;
pub mod errors;
pub mod events;
pub mod loaders;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::cache::{CacheKey, CacheStats, CacheStore, InMemoryCacheStore, LoaderCache};
    pub use crate::context::LoaderContext;
    pub use crate::core::{
        Content, ContentMode, Diagnostic, DiagnosticKind, EmittedFile, Options,
        PipelineRequest, PipelineResult, UnitSpec,
    };
    pub use crate::effects::{HashFunction, SideEffectChannel};
    pub use crate::errors::{
        ConfigurationError, LoaderError, Phase, PipelineError, ProtocolViolation,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::loaders::{Completion, FnLoader, Loader, PitchOutcome, PitchRequest};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        CancellationToken, Completer, LoaderRunner, RunOptions, RunnerConfig,
    };
}
