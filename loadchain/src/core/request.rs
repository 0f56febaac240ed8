//! Unit specifications and pipeline requests.

use super::Content;
use crate::errors::ConfigurationError;
use crate::loaders::Loader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options handed to a loader. The engine never interprets them.
pub type Options = serde_json::Map<String, serde_json::Value>;

/// Identifier and options of one loader in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// The loader identifier.
    pub identifier: String,
    /// Options for the loader.
    #[serde(default)]
    pub options: Options,
}

impl UnitSpec {
    /// Creates a spec with no options.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            options: Options::new(),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Adds a single option.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Renders the loader as a request segment: `identifier` or `identifier?{options}`.
    #[must_use]
    pub fn request_string(&self) -> String {
        if self.options.is_empty() {
            self.identifier.clone()
        } else {
            let options = serde_json::to_string(&self.options).unwrap_or_default();
            format!("{}?{}", self.identifier, options)
        }
    }
}

/// A resolved chain entry: the spec plus the executable loader.
#[derive(Clone)]
pub struct ChainEntry {
    /// The loader spec.
    pub spec: UnitSpec,
    /// The executable loader.
    pub loader: Arc<dyn Loader>,
}

impl ChainEntry {
    /// Creates a new chain entry.
    #[must_use]
    pub fn new(spec: UnitSpec, loader: Arc<dyn Loader>) -> Self {
        Self { spec, loader }
    }

    /// Returns the loader identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.spec.identifier
    }
}

impl std::fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEntry")
            .field("spec", &self.spec)
            .field("loader", &self.loader)
            .finish()
    }
}

/// A request to run a resource through a loader chain.
///
/// `chain[0]` is the leftmost loader: it pitches first and transforms last.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Identifier of the resource, optionally with a `?query`.
    pub resource_id: String,
    /// The loader chain in require order.
    pub chain: Vec<ChainEntry>,
    /// The raw resource content.
    pub raw_content: Content,
}

impl PipelineRequest {
    /// Creates a request with an empty chain.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, raw_content: impl Into<Content>) -> Self {
        Self {
            resource_id: resource_id.into(),
            chain: Vec::new(),
            raw_content: raw_content.into(),
        }
    }

    /// Appends a loader to the right end of the chain.
    #[must_use]
    pub fn with_loader(mut self, spec: UnitSpec, loader: Arc<dyn Loader>) -> Self {
        self.chain.push(ChainEntry::new(spec, loader));
        self
    }

    /// Appends a loader with no options.
    #[must_use]
    pub fn with_unit(self, identifier: impl Into<String>, loader: Arc<dyn Loader>) -> Self {
        self.with_loader(UnitSpec::new(identifier), loader)
    }

    /// Returns the specs of the chain in order.
    #[must_use]
    pub fn specs(&self) -> Vec<UnitSpec> {
        self.chain.iter().map(|entry| entry.spec.clone()).collect()
    }

    /// Returns the resource path without its query.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        split_resource(&self.resource_id).0
    }

    /// Returns the resource query including the leading `?`, or an empty string.
    #[must_use]
    pub fn resource_query(&self) -> &str {
        split_resource(&self.resource_id).1
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource identifier or any loader identifier
    /// is empty or whitespace-only.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.resource_id.trim().is_empty() {
            return Err(ConfigurationError::EmptyResource);
        }
        if let Some(index) = self
            .chain
            .iter()
            .position(|entry| entry.spec.identifier.trim().is_empty())
        {
            return Err(ConfigurationError::EmptyIdentifier { index });
        }
        Ok(())
    }
}

/// Splits a resource identifier into path and `?query`.
pub(crate) fn split_resource(resource_id: &str) -> (&str, &str) {
    match resource_id.find('?') {
        Some(pos) => resource_id.split_at(pos),
        None => (resource_id, ""),
    }
}
