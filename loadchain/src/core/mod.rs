//! Core domain model types for loadchain.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Resource content and content modes
//! - Unit specifications, chain entries and pipeline requests
//! - Pipeline results, emitted files and diagnostics

mod content;
mod request;
mod result;

pub use content::{Content, ContentMode};
pub(crate) use request::split_resource;
pub use request::{ChainEntry, Options, PipelineRequest, UnitSpec};
pub use result::{Diagnostic, DiagnosticKind, EmittedFile, PipelineResult};

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
