//! Mock loaders for testing.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::context::LoaderContext;
use crate::core::Content;
use crate::loaders::{Completion, Loader, PitchOutcome, PitchRequest};
use crate::pipeline::Completer;

/// A shared, ordered log of loader invocations.
///
/// Entries read `pitch:<identifier>` or `transform:<identifier>`.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Counts entries starting with a prefix.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A loader that records every invocation and appends a suffix.
#[derive(Debug)]
pub struct RecordingLoader {
    log: CallLog,
    suffix: String,
    short_circuit: Option<Content>,
}

impl RecordingLoader {
    /// Creates a loader appending `suffix` to its input.
    #[must_use]
    pub fn new(log: CallLog, suffix: impl Into<String>) -> Self {
        Self {
            log,
            suffix: suffix.into(),
            short_circuit: None,
        }
    }

    /// Makes the pitch short-circuit with a value.
    #[must_use]
    pub fn short_circuit_with(mut self, value: impl Into<Content>) -> Self {
        self.short_circuit = Some(value.into());
        self
    }
}

impl Loader for RecordingLoader {
    fn pitch(
        &self,
        _request: PitchRequest<'_>,
        ctx: &LoaderContext,
    ) -> anyhow::Result<Completion<PitchOutcome>> {
        self.log.record(format!("pitch:{}", ctx.identifier()));
        Ok(Completion::Ready(match &self.short_circuit {
            Some(value) => PitchOutcome::ShortCircuit(value.clone()),
            None => PitchOutcome::Continue,
        }))
    }

    fn transform(&self, input: Content, ctx: &LoaderContext) -> anyhow::Result<Completion<Content>> {
        self.log.record(format!("transform:{}", ctx.identifier()));
        Ok(Completion::Ready(Content::Text(format!(
            "{}{}",
            input.to_text_lossy(),
            self.suffix
        ))))
    }
}

type TextMap = dyn Fn(&str) -> String + Send + Sync;

/// A loader that always suspends and completes from a spawned task.
///
/// Requires a running tokio runtime.
pub struct SuspendingLoader {
    map: Arc<TextMap>,
    delay: Duration,
}

impl SuspendingLoader {
    /// Creates a loader completing with `map(input)` after `delay`.
    pub fn new<F>(map: F, delay: Duration) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            map: Arc::new(map),
            delay,
        }
    }

    /// Creates a loader completing on the next scheduler turn.
    pub fn immediate<F>(map: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(map, Duration::ZERO)
    }
}

impl std::fmt::Debug for SuspendingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuspendingLoader")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Loader for SuspendingLoader {
    fn transform(&self, input: Content, ctx: &LoaderContext) -> anyhow::Result<Completion<Content>> {
        let completer = ctx.suspend()?;
        let map = self.map.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            if let Err(violation) = completer.succeed(map(&input.to_text_lossy())) {
                warn!(%violation, "Suspending loader completion rejected");
            }
        });

        Ok(Completion::Suspended)
    }
}

/// A loader that suspends and parks its completion handle.
///
/// Clones share the parked handle, so a test can keep one clone and fire
/// or drop the handle while the run is waiting.
#[derive(Debug, Clone, Default)]
pub struct HoldingLoader {
    held: Arc<Mutex<Option<Completer>>>,
}

impl HoldingLoader {
    /// Creates a loader with no parked handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the parked handle, if the loader has suspended.
    #[must_use]
    pub fn take(&self) -> Option<Completer> {
        self.held.lock().take()
    }
}

impl Loader for HoldingLoader {
    fn transform(&self, _input: Content, ctx: &LoaderContext) -> anyhow::Result<Completion<Content>> {
        *self.held.lock() = Some(ctx.suspend()?);
        Ok(Completion::Suspended)
    }
}

/// A loader whose transform always fails.
#[derive(Debug)]
pub struct FailingLoader {
    error: String,
}

impl FailingLoader {
    /// Creates a failing loader.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl Loader for FailingLoader {
    fn transform(&self, _input: Content, _ctx: &LoaderContext) -> anyhow::Result<Completion<Content>> {
        Err(anyhow::anyhow!(self.error.clone()))
    }
}
