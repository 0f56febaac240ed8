//! Execution context for loader invocations.
//!
//! A run owns one [`RunState`]; each invocation receives a [`LoaderContext`]
//! that points into it together with the invocation's suspension slot.

mod loader;
mod run;

pub use loader::LoaderContext;
pub(crate) use run::RunState;
