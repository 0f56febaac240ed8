//! The pipeline controller.
//!
//! Drives a request through `Init → Pitching → {ShortCircuited |
//! PitchesExhausted} → Normalizing → {Done | Failed}`.

use super::normal::run_normal_phase;
use super::pitch::{run_pitch_phase, PitchPhaseOutcome};
use super::suspension::SuspensionManager;
use super::{CancellationToken, RunnerConfig};
use crate::context::RunState;
use crate::core::{Content, PipelineRequest, PipelineResult};
use crate::effects::SideEffectChannel;
use crate::errors::LoaderError;
use crate::events::{get_event_sink, EventSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Controller states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Init,
    Pitching,
    ShortCircuited { index: usize },
    PitchesExhausted,
    Normalizing,
    Done,
    Failed,
}

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Token that aborts the run when cancelled.
    pub cancellation: Option<Arc<CancellationToken>>,
    /// Channel to collect side effects into; it survives a failed run.
    pub channel: Option<Arc<SideEffectChannel>>,
}

impl RunOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the side-effect channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<SideEffectChannel>) -> Self {
        self.channel = Some(channel);
        self
    }
}

/// Emits events for one run, tagged with its run ID.
pub(crate) struct RunEvents<'a> {
    sink: Option<&'a dyn EventSink>,
    run_id: Uuid,
}

impl RunEvents<'_> {
    pub(crate) fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(sink) = self.sink {
            data["run_id"] = serde_json::json!(self.run_id.to_string());
            sink.try_emit(event_type, Some(data));
        }
    }
}

/// Runs loader chains.
#[derive(Clone)]
pub struct LoaderRunner {
    config: RunnerConfig,
    event_sink: Arc<dyn EventSink>,
}

impl Default for LoaderRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderRunner {
    /// Creates a runner with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Creates a runner with a configuration.
    ///
    /// Events go to the process-wide default sink.
    #[must_use]
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            event_sink: get_event_sink(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs a request to completion.
    ///
    /// # Errors
    ///
    /// Returns a [`LoaderError`] if the request is unusable, a loader fails,
    /// a loader breaks the completion protocol, or the run is cancelled.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResult, LoaderError> {
        self.run_with(request, RunOptions::default()).await
    }

    /// Runs a request with caller-supplied cancellation and side-effect channel.
    ///
    /// # Errors
    ///
    /// See [`LoaderRunner::run`].
    pub async fn run_with(
        &self,
        request: PipelineRequest,
        options: RunOptions,
    ) -> Result<PipelineResult, LoaderError> {
        let started = Instant::now();
        request.validate()?;

        let run = Arc::new(RunState::new(
            request.resource_id.clone(),
            request.specs(),
            options.channel.unwrap_or_default(),
            options.cancellation.unwrap_or_else(CancellationToken::new),
            self.config.hash_function,
        ));

        let span = info_span!(
            "loader_run",
            run_id = %run.run_id(),
            resource = %request.resource_id,
            loaders = request.chain.len(),
        );

        self.drive(run, request, started).instrument(span).await
    }

    async fn drive(
        &self,
        run: Arc<RunState>,
        request: PipelineRequest,
        started: Instant,
    ) -> Result<PipelineResult, LoaderError> {
        let events = RunEvents {
            sink: self.config.emit_events.then_some(self.event_sink.as_ref()),
            run_id: run.run_id(),
        };
        events.emit(
            "run.started",
            serde_json::json!({
                "resource": request.resource_id,
                "loaders": request.chain.len(),
            }),
        );

        let mut status = RunStatus::Init;
        match self.execute(&run, request, &mut status, &events).await {
            Ok((output, short_circuit)) => {
                transition(&mut status, RunStatus::Done);
                let effects = run.channel().snapshot();
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

                events.emit(
                    "run.completed",
                    serde_json::json!({
                        "cacheable": run.is_cacheable(),
                        "emitted_files": effects.emitted_files.len(),
                        "duration_ms": duration_ms,
                    }),
                );

                Ok(PipelineResult {
                    run_id: run.run_id(),
                    output,
                    cacheable: run.is_cacheable(),
                    emitted_files: effects.emitted_files,
                    diagnostics: effects.diagnostics,
                    resource_dependencies: effects.resource_dependencies,
                    auxiliary_dependencies: effects.auxiliary_dependencies,
                    short_circuit,
                    duration_ms,
                })
            }
            Err(err) => {
                transition(&mut status, RunStatus::Failed);
                warn!(error = %err, "Loader run failed");
                events.emit("run.failed", serde_json::json!(err.to_dict()));
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        run: &Arc<RunState>,
        request: PipelineRequest,
        status: &mut RunStatus,
        events: &RunEvents<'_>,
    ) -> Result<(Content, Option<usize>), LoaderError> {
        if request.chain.is_empty() {
            return Ok((request.raw_content, None));
        }

        let manager = SuspensionManager::new(run, self.config.completion_timeout());

        transition(status, RunStatus::Pitching);
        let (start, value, short_circuit) =
            match run_pitch_phase(run, &request.chain, &manager, events).await? {
                PitchPhaseOutcome::ShortCircuited { index, value } => {
                    transition(status, RunStatus::ShortCircuited { index });
                    (index.checked_sub(1), value, Some(index))
                }
                PitchPhaseOutcome::Exhausted => {
                    transition(status, RunStatus::PitchesExhausted);
                    (request.chain.len().checked_sub(1), request.raw_content, None)
                }
            };

        transition(status, RunStatus::Normalizing);
        let output = run_normal_phase(run, &request.chain, start, value, &manager, events).await?;

        if let Some(violation) = run.violation() {
            return Err(violation.into());
        }
        Ok((output, short_circuit))
    }
}

impl std::fmt::Debug for LoaderRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn transition(status: &mut RunStatus, next: RunStatus) {
    debug!(from = ?*status, to = ?next, "Run status changed");
    *status = next;
}
