//! State shared by every loader invocation of one run.

use crate::core::{Options, UnitSpec};
use crate::effects::{HashFunction, SideEffectChannel};
use crate::errors::{PipelineError, ProtocolViolation};
use crate::pipeline::CancellationToken;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// The mutable state of a single pipeline run.
pub(crate) struct RunState {
    run_id: Uuid,
    resource_id: String,
    chain: Vec<UnitSpec>,
    cacheable: AtomicBool,
    forwarded: RwLock<Options>,
    channel: Arc<SideEffectChannel>,
    failure: Mutex<Option<PipelineError>>,
    violation: Mutex<Option<ProtocolViolation>>,
    cancellation: Arc<CancellationToken>,
    timed_out: AtomicBool,
    hash_function: HashFunction,
}

impl RunState {
    pub(crate) fn new(
        resource_id: impl Into<String>,
        chain: Vec<UnitSpec>,
        channel: Arc<SideEffectChannel>,
        cancellation: Arc<CancellationToken>,
        hash_function: HashFunction,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            resource_id: resource_id.into(),
            chain,
            cacheable: AtomicBool::new(true),
            forwarded: RwLock::new(Options::new()),
            channel,
            failure: Mutex::new(None),
            violation: Mutex::new(None),
            cancellation,
            timed_out: AtomicBool::new(false),
            hash_function,
        }
    }

    pub(crate) fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub(crate) fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub(crate) fn chain(&self) -> &[UnitSpec] {
        &self.chain
    }

    pub(crate) fn identifier(&self, index: usize) -> &str {
        self.chain.get(index).map_or("", |spec| spec.identifier.as_str())
    }

    pub(crate) fn channel(&self) -> &Arc<SideEffectChannel> {
        &self.channel
    }

    pub(crate) fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    pub(crate) fn is_cacheable(&self) -> bool {
        self.cacheable.load(Ordering::SeqCst)
    }

    /// Clears the cacheable flag. Once cleared it stays cleared.
    pub(crate) fn clear_cacheable(&self) {
        self.cacheable.store(false, Ordering::SeqCst);
    }

    pub(crate) fn forwarded(&self) -> Options {
        self.forwarded.read().clone()
    }

    pub(crate) fn set_forwarded(&self, data: Options) {
        *self.forwarded.write() = data;
    }

    /// Records the first loader-reported failure of the run.
    pub(crate) fn record_failure(&self, error: PipelineError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    pub(crate) fn take_failure(&self) -> Option<PipelineError> {
        self.failure.lock().take()
    }

    /// Records the first protocol violation of the run.
    pub(crate) fn record_violation(&self, violation: ProtocolViolation) {
        warn!(run_id = %self.run_id, "Protocol violation: {}", violation);
        let mut slot = self.violation.lock();
        if slot.is_none() {
            *slot = Some(violation);
        }
    }

    pub(crate) fn violation(&self) -> Option<ProtocolViolation> {
        self.violation.lock().clone()
    }

    pub(crate) fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    pub(crate) fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    /// Returns true once the run stopped awaiting completions.
    pub(crate) fn is_aborted(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst) || self.cancellation.is_cancelled()
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("run_id", &self.run_id)
            .field("resource_id", &self.resource_id)
            .field("chain_len", &self.chain.len())
            .field("cacheable", &self.is_cacheable())
            .finish()
    }
}
