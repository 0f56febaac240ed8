//! Results and side-effect records of a pipeline run.

use super::Content;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A derived file emitted by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedFile {
    /// The interpolated file name.
    pub name: String,
    /// The file content.
    #[serde(with = "super::base64_bytes")]
    pub content: Vec<u8>,
    /// Identifier of the loader that emitted it.
    pub unit_identifier: String,
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Non-fatal; never aborts the run.
    Warning,
    /// Fatal; fails the run.
    Error,
}

/// A warning or error reported by a loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity.
    pub kind: DiagnosticKind,
    /// The message.
    pub message: String,
    /// Identifier of the reporting loader.
    pub unit_identifier: String,
}

impl Diagnostic {
    /// Creates a warning.
    #[must_use]
    pub fn warning(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            message: message.into(),
            unit_identifier: unit.into(),
        }
    }

    /// Creates an error.
    #[must_use]
    pub fn error(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            message: message.into(),
            unit_identifier: unit.into(),
        }
    }

    /// Returns true if this is a warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.kind == DiagnosticKind::Warning
    }
}

/// The outcome of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Identifier of the run that produced this result.
    pub run_id: Uuid,
    /// The final transformed content.
    pub output: Content,
    /// Whether the result may be reused for the same resource and chain.
    pub cacheable: bool,
    /// Emitted files, unique by name and sorted by name.
    #[serde(default)]
    pub emitted_files: Vec<EmittedFile>,
    /// Diagnostics in emission order.
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Files the output depends on.
    #[serde(default)]
    pub resource_dependencies: BTreeSet<String>,
    /// Directories or other inputs the output depends on.
    #[serde(default)]
    pub auxiliary_dependencies: BTreeSet<String>,
    /// Index of the loader whose pitch short-circuited the chain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_circuit: Option<usize>,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: f64,
}

impl PipelineResult {
    /// Looks up an emitted file by name.
    #[must_use]
    pub fn emitted_file(&self, name: &str) -> Option<&EmittedFile> {
        self.emitted_files.iter().find(|file| file.name == name)
    }

    /// Returns the warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    /// Returns the output as text, decoding bytes lossily.
    #[must_use]
    pub fn output_text(&self) -> std::borrow::Cow<'_, str> {
        self.output.to_text_lossy()
    }
}
