//! The capability handle passed to every loader invocation.

use super::RunState;
use crate::core::{split_resource, Options, UnitSpec};
use crate::effects::{interpolate_name, SideEffectChannel};
use crate::errors::{ConfigurationError, Phase, PipelineError, ProtocolViolation};
use crate::pipeline::{Completer, SuspensionSlot};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// Context for one loader invocation.
///
/// Clones share the same run state and suspension slot, so a clone can be
/// moved into a spawned task that finishes the work asynchronously.
#[derive(Clone)]
pub struct LoaderContext {
    run: Arc<RunState>,
    index: usize,
    phase: Phase,
    suspension: Arc<SuspensionSlot>,
}

impl LoaderContext {
    pub(crate) fn new(run: Arc<RunState>, index: usize, phase: Phase) -> Self {
        let suspension = Arc::new(SuspensionSlot::new(run.identifier(index), run.clone()));
        Self {
            run,
            index,
            phase,
            suspension,
        }
    }

    pub(crate) fn suspension(&self) -> &SuspensionSlot {
        &self.suspension
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run.run_id()
    }

    /// Returns the resource identifier including any query.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        self.run.resource_id()
    }

    /// Returns the resource path without its query.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        split_resource(self.run.resource_id()).0
    }

    /// Returns the resource query including `?`, or an empty string.
    #[must_use]
    pub fn resource_query(&self) -> &str {
        split_resource(self.run.resource_id()).1
    }

    /// Returns the position of the active loader.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the phase of this invocation.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the active loader's identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.run.identifier(self.index)
    }

    /// Returns the whole chain.
    #[must_use]
    pub fn chain(&self) -> &[UnitSpec] {
        self.run.chain()
    }

    /// Returns the active loader's options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.run.chain()[self.index].options
    }

    /// Deserializes the active loader's options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidOptions`] if the options do not
    /// match `T`.
    pub fn options_as<T: DeserializeOwned>(&self) -> Result<T, ConfigurationError> {
        serde_json::from_value(serde_json::Value::Object(self.options().clone())).map_err(|err| {
            ConfigurationError::InvalidOptions {
                unit: self.identifier().to_string(),
                message: err.to_string(),
            }
        })
    }

    /// Returns the data accumulated by pitches.
    #[must_use]
    pub fn forwarded_data(&self) -> Options {
        self.run.forwarded()
    }

    /// Marks the output as cacheable or not.
    ///
    /// Only clearing has an effect: once any loader marks the run not
    /// cacheable it stays that way.
    pub fn set_cacheable(&self, cacheable: bool) {
        if !cacheable {
            self.run.clear_cacheable();
        }
    }

    /// Returns whether the run is still cacheable.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.run.is_cacheable()
    }

    /// Emits a derived file and returns its interpolated name.
    pub fn emit_file(&self, name_template: &str, content: impl Into<Vec<u8>>) -> String {
        let content = content.into();
        let name = interpolate_name(
            name_template,
            self.run.resource_id(),
            &content,
            self.run.hash_function(),
        );
        self.run
            .channel()
            .emit_file(self.identifier(), name.clone(), content);
        name
    }

    /// Emits a non-fatal warning.
    pub fn emit_warning(&self, message: impl Into<String>) {
        self.run.channel().warn(self.identifier(), message);
    }

    /// Emits an error. The run fails once this invocation settles.
    pub fn emit_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.run.channel().error(self.identifier(), message.clone());
        self.run.record_failure(PipelineError::new(
            self.phase,
            self.index,
            self.identifier(),
            message,
        ));
    }

    /// Records a file the output depends on.
    pub fn add_dependency(&self, path: impl Into<String>) {
        self.run.channel().add_dependency(path);
    }

    /// Records a directory or other input the output depends on.
    pub fn add_auxiliary_dependency(&self, path: impl Into<String>) {
        self.run.channel().add_auxiliary_dependency(path);
    }

    /// Returns the run's side-effect channel.
    #[must_use]
    pub fn channel(&self) -> &Arc<SideEffectChannel> {
        self.run.channel()
    }

    /// Declares that this invocation completes later.
    ///
    /// The loader must then return [`Completion::Suspended`] and eventually
    /// fire the returned handle exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::SuspendedTwice`] if called more than once
    /// in the same invocation.
    ///
    /// [`Completion::Suspended`]: crate::loaders::Completion::Suspended
    pub fn suspend(&self) -> Result<Completer, ProtocolViolation> {
        self.suspension.request()
    }

    /// Returns true once the run has been aborted or timed out.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.run.is_aborted()
    }
}

impl std::fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderContext")
            .field("run_id", &self.run.run_id())
            .field("index", &self.index)
            .field("identifier", &self.identifier())
            .field("phase", &self.phase)
            .finish()
    }
}
