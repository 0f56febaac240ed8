//! Side effects loaders produce besides their output.
//!
//! This module provides:
//! - The per-run side-effect channel
//! - File name interpolation for emitted files

mod channel;
mod interpolate;

pub use channel::{SideEffectChannel, SideEffects};
pub use interpolate::{interpolate_name, HashFunction};
