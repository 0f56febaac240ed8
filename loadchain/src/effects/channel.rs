//! Per-run collection of loader side effects.

use crate::core::{Diagnostic, DiagnosticKind, EmittedFile};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Collects emitted files, diagnostics and dependencies for one run.
///
/// The channel is append-only: nothing is rolled back when the run fails.
/// Emitting a file under an existing name replaces the earlier file.
#[derive(Debug, Default)]
pub struct SideEffectChannel {
    files: RwLock<BTreeMap<String, EmittedFile>>,
    diagnostics: RwLock<Vec<Diagnostic>>,
    resource_dependencies: RwLock<BTreeSet<String>>,
    auxiliary_dependencies: RwLock<BTreeSet<String>>,
}

/// A point-in-time copy of a channel's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffects {
    /// Emitted files sorted by name.
    pub emitted_files: Vec<EmittedFile>,
    /// Diagnostics in emission order.
    pub diagnostics: Vec<Diagnostic>,
    /// Resource dependencies.
    pub resource_dependencies: BTreeSet<String>,
    /// Auxiliary dependencies.
    pub auxiliary_dependencies: BTreeSet<String>,
}

impl SideEffectChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an emitted file, returning the file it replaced.
    pub fn emit_file(
        &self,
        unit: impl Into<String>,
        name: impl Into<String>,
        content: Vec<u8>,
    ) -> Option<EmittedFile> {
        let file = EmittedFile {
            name: name.into(),
            content,
            unit_identifier: unit.into(),
        };
        let replaced = self.files.write().insert(file.name.clone(), file);
        if let Some(ref previous) = replaced {
            debug!(
                file = %previous.name,
                previous_unit = %previous.unit_identifier,
                "Emitted file replaced an earlier emission"
            );
        }
        replaced
    }

    /// Records a warning.
    pub fn warn(&self, unit: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(unit, message);
        debug!(unit = %diagnostic.unit_identifier, "Loader warning: {}", diagnostic.message);
        self.diagnostics.write().push(diagnostic);
    }

    /// Records an error.
    pub fn error(&self, unit: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic::error(unit, message);
        warn!(unit = %diagnostic.unit_identifier, "Loader error: {}", diagnostic.message);
        self.diagnostics.write().push(diagnostic);
    }

    /// Records a file the output depends on.
    pub fn add_dependency(&self, path: impl Into<String>) {
        self.resource_dependencies.write().insert(path.into());
    }

    /// Records a directory or other non-file input the output depends on.
    pub fn add_auxiliary_dependency(&self, path: impl Into<String>) {
        self.auxiliary_dependencies.write().insert(path.into());
    }

    /// Returns the emitted files sorted by name.
    #[must_use]
    pub fn emitted_files(&self) -> Vec<EmittedFile> {
        self.files.read().values().cloned().collect()
    }

    /// Returns all diagnostics in emission order.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.read().clone()
    }

    /// Returns the error diagnostics.
    #[must_use]
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .read()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
            .cloned()
            .collect()
    }

    /// Returns the resource dependencies.
    #[must_use]
    pub fn resource_dependencies(&self) -> BTreeSet<String> {
        self.resource_dependencies.read().clone()
    }

    /// Returns the auxiliary dependencies.
    #[must_use]
    pub fn auxiliary_dependencies(&self) -> BTreeSet<String> {
        self.auxiliary_dependencies.read().clone()
    }

    /// Copies the current contents.
    #[must_use]
    pub fn snapshot(&self) -> SideEffects {
        SideEffects {
            emitted_files: self.emitted_files(),
            diagnostics: self.diagnostics(),
            resource_dependencies: self.resource_dependencies(),
            auxiliary_dependencies: self.auxiliary_dependencies(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_file_last_write_wins() {
        let channel = SideEffectChannel::new();

        assert!(channel.emit_file("a", "out.txt", b"first".to_vec()).is_none());
        let replaced = channel.emit_file("b", "out.txt", b"second".to_vec());

        assert_eq!(replaced.unwrap().content, b"first");
        let files = channel.emitted_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, b"second");
        assert_eq!(files[0].unit_identifier, "b");
    }

    #[test]
    fn test_files_sorted_by_name() {
        let channel = SideEffectChannel::new();
        channel.emit_file("a", "z.txt", Vec::new());
        channel.emit_file("a", "a.txt", Vec::new());

        let names: Vec<_> = channel.emitted_files().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a.txt", "z.txt"]);
    }

    #[test]
    fn test_diagnostics_keep_order() {
        let channel = SideEffectChannel::new();
        channel.warn("a", "first");
        channel.error("b", "second");
        channel.warn("c", "third");

        let messages: Vec<_> = channel.diagnostics().into_iter().map(|d| d.message).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(channel.errors().len(), 1);
    }

    #[test]
    fn test_dependencies_are_sets() {
        let channel = SideEffectChannel::new();
        channel.add_dependency("src/a.scss");
        channel.add_dependency("src/a.scss");
        channel.add_auxiliary_dependency("src/partials");

        let snapshot = channel.snapshot();
        assert_eq!(snapshot.resource_dependencies.len(), 1);
        assert!(snapshot.auxiliary_dependencies.contains("src/partials"));
    }
}
