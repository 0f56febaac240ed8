//! Left-to-right pitch pass.

use super::runner::RunEvents;
use super::suspension::{Settled, SuspensionManager};
use crate::context::{LoaderContext, RunState};
use crate::core::{ChainEntry, Content, Options};
use crate::errors::{LoaderError, Phase};
use crate::loaders::{PitchOutcome, PitchRequest};
use std::sync::Arc;
use tracing::debug;

/// How the pitch pass ended.
#[derive(Debug)]
pub(crate) enum PitchPhaseOutcome {
    /// The loader at `index` supplied `value`.
    ShortCircuited { index: usize, value: Content },
    /// Every loader pitched without a value.
    Exhausted,
}

/// Pitches every loader from left to right until one short-circuits.
pub(crate) async fn run_pitch_phase(
    run: &Arc<RunState>,
    chain: &[ChainEntry],
    manager: &SuspensionManager<'_>,
    events: &RunEvents<'_>,
) -> Result<PitchPhaseOutcome, LoaderError> {
    let specs = run.chain();
    let mut forwarded = Options::new();

    for (index, entry) in chain.iter().enumerate() {
        let unit = entry.identifier();
        manager
            .ensure_active()
            .map_err(|interrupt| interrupt.into_error(Phase::Pitch, index, unit))?;

        if !entry.loader.cacheable() {
            run.clear_cacheable();
        }

        let ctx = LoaderContext::new(run.clone(), index, Phase::Pitch);
        let returned = entry.loader.pitch(
            PitchRequest {
                index,
                remaining: &specs[index + 1..],
                preceding: &specs[..index],
                resource_id: run.resource_id(),
                forwarded: &mut forwarded,
            },
            &ctx,
        );

        let settled = manager
            .settle(ctx.suspension(), returned)
            .await
            .map_err(|interrupt| interrupt.into_error(Phase::Pitch, index, unit))?;

        let value = match settled {
            Settled::Immediate(PitchOutcome::Continue) | Settled::Deferred(None) => None,
            Settled::Immediate(PitchOutcome::ShortCircuit(value)) | Settled::Deferred(Some(value)) => {
                Some(value)
            }
        };

        events.emit(
            "loader.pitched",
            serde_json::json!({ "unit": unit, "index": index }),
        );

        if let Some(value) = value {
            debug!(unit = %unit, index, "Pitch short-circuited the chain");
            events.emit(
                "loader.short_circuited",
                serde_json::json!({ "unit": unit, "index": index }),
            );
            run.set_forwarded(forwarded);
            return Ok(PitchPhaseOutcome::ShortCircuited { index, value });
        }
    }

    run.set_forwarded(forwarded);
    Ok(PitchPhaseOutcome::Exhausted)
}
