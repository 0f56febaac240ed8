//! Reconciles synchronous returns with asynchronous completion.
//!
//! Every invocation ends in exactly one of: an immediate value, a successful
//! completion, or an error completion. Anything else is a
//! [`ProtocolViolation`].

use crate::context::RunState;
use crate::core::Content;
use crate::errors::{LoaderError, Phase, PipelineError, ProtocolViolation};
use crate::loaders::Completion;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// What a completion handle delivers: `None` means "no value".
type Resolution = anyhow::Result<Option<Content>>;

/// Per-invocation suspension bookkeeping.
pub(crate) struct SuspensionSlot {
    unit: String,
    run: Arc<RunState>,
    requested: AtomicBool,
    receiver: Mutex<Option<oneshot::Receiver<Resolution>>>,
}

impl SuspensionSlot {
    pub(crate) fn new(unit: impl Into<String>, run: Arc<RunState>) -> Self {
        Self {
            unit: unit.into(),
            run,
            requested: AtomicBool::new(false),
            receiver: Mutex::new(None),
        }
    }

    pub(crate) fn request(&self) -> Result<Completer, ProtocolViolation> {
        if self.requested.swap(true, Ordering::SeqCst) {
            let violation = ProtocolViolation::SuspendedTwice {
                unit: self.unit.clone(),
            };
            self.run.record_violation(violation.clone());
            return Err(violation);
        }

        let (sender, receiver) = oneshot::channel();
        *self.receiver.lock() = Some(receiver);

        Ok(Completer {
            cell: Arc::new(CompletionCell {
                unit: self.unit.clone(),
                run: self.run.clone(),
                sender: Mutex::new(Some(sender)),
            }),
        })
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn take_receiver(&self) -> Option<oneshot::Receiver<Resolution>> {
        self.receiver.lock().take()
    }
}

struct CompletionCell {
    unit: String,
    run: Arc<RunState>,
    sender: Mutex<Option<oneshot::Sender<Resolution>>>,
}

/// Handle a suspended loader fires to deliver its result.
///
/// Clones refer to the same completion; it may fire once in total. Dropping
/// every clone without firing abandons the invocation.
#[derive(Clone)]
pub struct Completer {
    cell: Arc<CompletionCell>,
}

impl Completer {
    /// Completes with a value or an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::CompletedTwice`] if the completion
    /// already fired. The violation is also recorded on the run.
    pub fn complete(&self, result: anyhow::Result<Content>) -> Result<(), ProtocolViolation> {
        self.resolve(result.map(Some))
    }

    /// Completes successfully with a value.
    ///
    /// From a pitch, the value short-circuits the chain.
    pub fn succeed(&self, content: impl Into<Content>) -> Result<(), ProtocolViolation> {
        self.resolve(Ok(Some(content.into())))
    }

    /// Completes with an error.
    pub fn fail(&self, error: impl Into<anyhow::Error>) -> Result<(), ProtocolViolation> {
        self.resolve(Err(error.into()))
    }

    /// Completes a pitch without a value, continuing the pitch phase.
    pub fn proceed(&self) -> Result<(), ProtocolViolation> {
        self.resolve(Ok(None))
    }

    /// Returns the identifier of the loader this handle belongs to.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.cell.unit
    }

    fn resolve(&self, resolution: Resolution) -> Result<(), ProtocolViolation> {
        let Some(sender) = self.cell.sender.lock().take() else {
            let violation = ProtocolViolation::CompletedTwice {
                unit: self.cell.unit.clone(),
            };
            self.cell.run.record_violation(violation.clone());
            return Err(violation);
        };

        if self.cell.run.is_aborted() {
            debug!(unit = %self.cell.unit, "Ignoring completion for an aborted run");
            return Ok(());
        }

        if sender.send(resolution).is_err() {
            debug!(unit = %self.cell.unit, "Completion arrived after the run stopped waiting");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("unit", &self.cell.unit)
            .field("fired", &self.cell.sender.lock().is_none())
            .finish()
    }
}

/// How an invocation settled.
#[derive(Debug)]
pub(crate) enum Settled<T> {
    /// The loader returned the value directly.
    Immediate(T),
    /// The loader completed through its handle.
    Deferred(Option<Content>),
}

/// Why an invocation did not produce a value.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Unit(anyhow::Error),
    Failed(PipelineError),
    Protocol(ProtocolViolation),
    Cancelled(String),
}

impl Interrupt {
    pub(crate) fn into_error(self, phase: Phase, index: usize, unit: &str) -> LoaderError {
        match self {
            Self::Unit(cause) => PipelineError::from_cause(phase, index, unit, &cause).into(),
            Self::Failed(error) => error.into(),
            Self::Protocol(violation) => violation.into(),
            Self::Cancelled(reason) => LoaderError::Cancelled(reason),
        }
    }
}

/// Settles loader invocations for one run.
pub(crate) struct SuspensionManager<'a> {
    run: &'a RunState,
    timeout: Option<Duration>,
}

impl<'a> SuspensionManager<'a> {
    pub(crate) fn new(run: &'a RunState, timeout: Option<Duration>) -> Self {
        Self { run, timeout }
    }

    /// Fails fast if the run was aborted before an invocation starts.
    pub(crate) fn ensure_active(&self) -> Result<(), Interrupt> {
        if let Some(violation) = self.run.violation() {
            return Err(Interrupt::Protocol(violation));
        }
        if self.run.is_aborted() {
            let reason = self
                .run
                .cancellation()
                .reason()
                .unwrap_or_else(|| "run aborted".to_string());
            return Err(Interrupt::Cancelled(reason));
        }
        Ok(())
    }

    /// Turns what a loader returned into its settled outcome, awaiting the
    /// completion handle if the loader suspended.
    pub(crate) async fn settle<T>(
        &self,
        slot: &SuspensionSlot,
        returned: anyhow::Result<Completion<T>>,
    ) -> Result<Settled<T>, Interrupt> {
        let outcome = match returned {
            Err(err) => Err(Interrupt::Unit(err)),
            Ok(Completion::Ready(_)) if slot.is_requested() => {
                Err(Interrupt::Protocol(ProtocolViolation::ReturnedWhileSuspended {
                    unit: slot.unit.clone(),
                }))
            }
            Ok(Completion::Ready(value)) => Ok(Settled::Immediate(value)),
            Ok(Completion::Suspended) => match slot.take_receiver() {
                Some(receiver) => self.await_completion(&slot.unit, receiver).await,
                None => Err(Interrupt::Protocol(
                    ProtocolViolation::SuspendedWithoutHandle {
                        unit: slot.unit.clone(),
                    },
                )),
            },
        };

        // A recorded violation outranks whatever the loader reported.
        if let Some(violation) = self.run.violation() {
            return Err(Interrupt::Protocol(violation));
        }
        if let Some(failure) = self.run.take_failure() {
            return Err(Interrupt::Failed(failure));
        }
        outcome
    }

    async fn await_completion<T>(
        &self,
        unit: &str,
        receiver: oneshot::Receiver<Resolution>,
    ) -> Result<Settled<T>, Interrupt> {
        debug!(unit = %unit, "Awaiting suspended loader");
        let token = self.run.cancellation().clone();

        let wait = async {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    Err(Interrupt::Cancelled(token.reason().unwrap_or_default()))
                }
                received = receiver => match received {
                    Ok(Ok(value)) => Ok(Settled::Deferred(value)),
                    Ok(Err(err)) => Err(Interrupt::Unit(err)),
                    Err(_) => Err(Interrupt::Protocol(ProtocolViolation::Abandoned {
                        unit: unit.to_string(),
                    })),
                },
            }
        };

        match self.timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    self.run.mark_timed_out();
                    self.run
                        .channel()
                        .error(unit, format!("Timed out after {timeout_ms}ms awaiting completion"));
                    Err(Interrupt::Protocol(ProtocolViolation::Timeout {
                        unit: unit.to_string(),
                        timeout_ms,
                    }))
                }
            },
        }
    }
}
