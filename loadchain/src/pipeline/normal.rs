//! Right-to-left transform pass.

use super::runner::RunEvents;
use super::suspension::{Settled, SuspensionManager};
use crate::context::{LoaderContext, RunState};
use crate::core::{ChainEntry, Content};
use crate::errors::{LoaderError, Phase, ProtocolViolation};
use std::sync::Arc;

/// Transforms `value` through `chain[start..=0]`, rightmost first.
///
/// With no start index the value is returned as is.
pub(crate) async fn run_normal_phase(
    run: &Arc<RunState>,
    chain: &[ChainEntry],
    start: Option<usize>,
    mut value: Content,
    manager: &SuspensionManager<'_>,
    events: &RunEvents<'_>,
) -> Result<Content, LoaderError> {
    let Some(start) = start else {
        return Ok(value);
    };

    for index in (0..=start).rev() {
        let entry = &chain[index];
        let unit = entry.identifier();
        manager
            .ensure_active()
            .map_err(|interrupt| interrupt.into_error(Phase::Normal, index, unit))?;

        if !entry.loader.cacheable() {
            run.clear_cacheable();
        }

        let ctx = LoaderContext::new(run.clone(), index, Phase::Normal);
        let input = value.into_mode(entry.loader.content_mode());
        let returned = entry.loader.transform(input, &ctx);

        value = match manager
            .settle(ctx.suspension(), returned)
            .await
            .map_err(|interrupt| interrupt.into_error(Phase::Normal, index, unit))?
        {
            Settled::Immediate(output) | Settled::Deferred(Some(output)) => output,
            Settled::Deferred(None) => {
                return Err(ProtocolViolation::MissingOutput {
                    unit: unit.to_string(),
                }
                .into());
            }
        };

        events.emit(
            "loader.transformed",
            serde_json::json!({ "unit": unit, "index": index, "bytes": value.len() }),
        );
    }

    Ok(value)
}
