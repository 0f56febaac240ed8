//! Ready-made loaders and requests for tests.

use std::sync::Arc;

use futures::future::join_all;

use crate::core::{Content, PipelineRequest, PipelineResult};
use crate::errors::LoaderError;
use crate::events::NoOpEventSink;
use crate::loaders::{FnLoader, Loader};
use crate::pipeline::{LoaderRunner, RunnerConfig};

use super::SuspendingLoader;

/// A synchronous loader repeating its text twice.
#[must_use]
pub fn doubler() -> Arc<dyn Loader> {
    Arc::new(FnLoader::map_text(|text| text.repeat(2)))
}

/// A synchronous loader upper-casing its text.
#[must_use]
pub fn upper() -> Arc<dyn Loader> {
    Arc::new(FnLoader::map_text(str::to_uppercase))
}

/// A suspending loader upper-casing its text.
#[must_use]
pub fn async_upper() -> Arc<dyn Loader> {
    Arc::new(SuspendingLoader::immediate(str::to_uppercase))
}

/// Builds a request from `(identifier, loader)` pairs in chain order.
#[must_use]
pub fn request(
    resource_id: &str,
    content: impl Into<Content>,
    units: Vec<(&str, Arc<dyn Loader>)>,
) -> PipelineRequest {
    units
        .into_iter()
        .fold(PipelineRequest::new(resource_id, content), |request, (id, loader)| {
            request.with_unit(id, loader)
        })
}

/// A runner that emits no events.
#[must_use]
pub fn quiet_runner() -> LoaderRunner {
    quiet_runner_with(RunnerConfig::default())
}

/// A runner with a configuration that emits no events.
#[must_use]
pub fn quiet_runner_with(config: RunnerConfig) -> LoaderRunner {
    LoaderRunner::with_config(config).with_event_sink(Arc::new(NoOpEventSink))
}

/// Runs requests concurrently on one runner.
pub async fn run_all(
    runner: &LoaderRunner,
    requests: Vec<PipelineRequest>,
) -> Vec<Result<PipelineResult, LoaderError>> {
    join_all(requests.into_iter().map(|request| runner.run(request))).await
}
