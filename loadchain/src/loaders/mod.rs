//! The loader contract and closure-backed loaders.
//!
//! Loaders are the units of a chain. Each exposes a mandatory `transform`
//! and an optional `pitch`. Either may finish immediately by returning
//! [`Completion::Ready`], or suspend by taking a completion handle from
//! [`LoaderContext::suspend`] and returning [`Completion::Suspended`].

use crate::context::LoaderContext;
use crate::core::{Content, ContentMode, Options, UnitSpec};
use std::fmt::Debug;
use std::sync::Arc;

/// How a loader invocation finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    /// The value is available now.
    Ready(T),
    /// The loader will complete later through its completion handle.
    Suspended,
}

/// Result of a pitch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PitchOutcome {
    /// Keep pitching.
    #[default]
    Continue,
    /// Stop pitching and feed this value to the loaders left of this one.
    ShortCircuit(Content),
}

/// Arguments handed to a pitch.
#[derive(Debug)]
pub struct PitchRequest<'a> {
    /// Position of the pitching loader.
    pub index: usize,
    /// Loaders to the right of this one.
    pub remaining: &'a [UnitSpec],
    /// Loaders to the left of this one.
    pub preceding: &'a [UnitSpec],
    /// The resource identifier.
    pub resource_id: &'a str,
    /// Data accumulated by earlier pitches; later pitches and transforms see it.
    pub forwarded: &'a mut Options,
}

impl PitchRequest<'_> {
    /// Renders the remaining loaders and the resource as a `!`-joined request.
    #[must_use]
    pub fn remaining_request(&self) -> String {
        join_request(self.remaining, Some(self.resource_id))
    }

    /// Renders the preceding loaders as a `!`-joined request.
    #[must_use]
    pub fn preceding_request(&self) -> String {
        join_request(self.preceding, None)
    }
}

fn join_request(specs: &[UnitSpec], resource: Option<&str>) -> String {
    specs
        .iter()
        .map(UnitSpec::request_string)
        .chain(resource.map(str::to_string))
        .collect::<Vec<_>>()
        .join("!")
}

/// A transformation unit in a loader chain.
pub trait Loader: Send + Sync + Debug {
    /// Returns how input and output are represented.
    fn content_mode(&self) -> ContentMode {
        ContentMode::Text
    }

    /// Returns whether output is cacheable unless cleared at runtime.
    fn cacheable(&self) -> bool {
        true
    }

    /// Runs during the left-to-right pass.
    ///
    /// Returning [`PitchOutcome::ShortCircuit`] skips every loader from this
    /// one rightwards.
    fn pitch(
        &self,
        _request: PitchRequest<'_>,
        _ctx: &LoaderContext,
    ) -> anyhow::Result<Completion<PitchOutcome>> {
        Ok(Completion::Ready(PitchOutcome::Continue))
    }

    /// Transforms the content during the right-to-left pass.
    fn transform(&self, input: Content, ctx: &LoaderContext) -> anyhow::Result<Completion<Content>>;
}

type TransformFn = dyn Fn(Content, &LoaderContext) -> anyhow::Result<Completion<Content>> + Send + Sync;
type PitchFn =
    dyn Fn(PitchRequest<'_>, &LoaderContext) -> anyhow::Result<Completion<PitchOutcome>> + Send + Sync;

/// A loader built from closures.
#[derive(Clone)]
pub struct FnLoader {
    transform: Arc<TransformFn>,
    pitch: Option<Arc<PitchFn>>,
    mode: ContentMode,
    cacheable: bool,
}

impl FnLoader {
    /// Creates a loader from a transform closure.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Content, &LoaderContext) -> anyhow::Result<Completion<Content>> + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            pitch: None,
            mode: ContentMode::Text,
            cacheable: true,
        }
    }

    /// Creates a synchronous text loader from a string mapping.
    pub fn map_text<F>(map: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(move |input, _ctx| {
            Ok(Completion::Ready(Content::Text(map(&input.to_text_lossy()))))
        })
    }

    /// Adds a pitch closure.
    #[must_use]
    pub fn with_pitch<F>(mut self, pitch: F) -> Self
    where
        F: Fn(PitchRequest<'_>, &LoaderContext) -> anyhow::Result<Completion<PitchOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.pitch = Some(Arc::new(pitch));
        self
    }

    /// Makes the loader receive raw bytes.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.mode = ContentMode::Raw;
        self
    }

    /// Declares the loader's output not cacheable by default.
    #[must_use]
    pub fn not_cacheable(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

impl Debug for FnLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLoader")
            .field("mode", &self.mode)
            .field("cacheable", &self.cacheable)
            .field("has_pitch", &self.pitch.is_some())
            .finish()
    }
}

impl Loader for FnLoader {
    fn content_mode(&self) -> ContentMode {
        self.mode
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }

    fn pitch(
        &self,
        request: PitchRequest<'_>,
        ctx: &LoaderContext,
    ) -> anyhow::Result<Completion<PitchOutcome>> {
        match &self.pitch {
            Some(pitch) => pitch(request, ctx),
            None => Ok(Completion::Ready(PitchOutcome::Continue)),
        }
    }

    fn transform(&self, input: Content, ctx: &LoaderContext) -> anyhow::Result<Completion<Content>> {
        (self.transform)(input, ctx)
    }
}
