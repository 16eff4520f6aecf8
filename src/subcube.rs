//! Runs one engine call per POV of a slice.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{CalcEngine, ConsolidationType};
use crate::error::{CubeError, CubeResult};
use crate::metadata::MetadataService;
use crate::progress::{CancelToken, ProgressSink};
use crate::slice::{Axis, Combos, Pov, Slice};

const FULL_CUBE: &[Axis] = &[
    Axis::Scenario,
    Axis::Year,
    Axis::Period,
    Axis::Entity,
    Axis::Value,
];
const ENTITY_CUBE: &[Axis] = &[Axis::Scenario, Axis::Year, Axis::Period, Axis::Entity];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    Allocate,
    Calculate { force: bool },
    Translate { force: bool },
    Consolidate { consolidation_type: ConsolidationType },
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Calculate { .. } => "calculate",
            Self::Translate { .. } => "translate",
            Self::Consolidate { .. } => "consolidate",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Allocate => "Allocating",
            Self::Calculate { .. } => "Calculating",
            Self::Translate { .. } => "Translating",
            Self::Consolidate { .. } => "Consolidating",
        }
    }

    /// Axes that must carry members; Consolidate works across all values.
    pub fn axes(self) -> &'static [Axis] {
        match self {
            Self::Consolidate { .. } => ENTITY_CUBE,
            _ => FULL_CUBE,
        }
    }

    fn reports_skips(self) -> bool {
        matches!(
            self,
            Self::Consolidate {
                consolidation_type: ConsolidationType::Impacted
            }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubcubeOutcome {
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PovResult {
    Executed,
    Skipped,
}

/// Fails when an axis `operation` needs has no members assigned.
pub fn check_axes(slice: &Slice, operation: Operation) -> CubeResult<()> {
    for &axis in operation.axes() {
        if !slice.is_assigned(axis) {
            return Err(CubeError::MissingAxis {
                operation: operation.name().to_string(),
                axis,
            });
        }
    }
    Ok(())
}

/// Executes `operation` for every POV of `slice`, in enumeration order.
///
/// Cancellation is only observed between POVs. A failure part way through
/// ends the batch with [`CubeError::Aborted`], which carries the counts
/// reached so far; POVs already executed stay executed. Progress is
/// finalised exactly once whenever it was initialised.
pub fn run_subcube_operation<M, E, P>(
    slice: &Slice,
    operation: Operation,
    metadata: &M,
    engine: &mut E,
    progress: &mut P,
    cancel: &CancelToken,
) -> CubeResult<SubcubeOutcome>
where
    M: MetadataService + ?Sized,
    E: CalcEngine + ?Sized,
    P: ProgressSink + ?Sized,
{
    check_axes(slice, operation)?;

    let combos = slice.combos();
    let mut outcome = SubcubeOutcome {
        total: combos.len(),
        ..SubcubeOutcome::default()
    };

    progress.init_progress(operation.label(), combos.len());
    let result = drive(
        &combos,
        operation,
        metadata,
        engine,
        progress,
        cancel,
        &mut outcome,
    );
    progress.end_progress();
    if let Err(err) = result {
        warn!(
            operation = operation.name(),
            performed = outcome.executed,
            not_needed = outcome.skipped,
            "{} aborted",
            operation.name()
        );
        return Err(CubeError::Aborted {
            operation: operation.name().to_string(),
            outcome,
            source: Box::new(err),
        });
    }

    if operation.reports_skips() {
        info!(
            operation = operation.name(),
            performed = outcome.executed,
            not_needed = outcome.skipped,
            "{} completed",
            operation.name()
        );
    } else {
        info!(
            operation = operation.name(),
            performed = outcome.executed,
            "{} completed",
            operation.name()
        );
    }
    Ok(outcome)
}

fn drive<M, E, P>(
    combos: &Combos<'_>,
    operation: Operation,
    metadata: &M,
    engine: &mut E,
    progress: &mut P,
    cancel: &CancelToken,
    outcome: &mut SubcubeOutcome,
) -> CubeResult<()>
where
    M: MetadataService + ?Sized,
    E: CalcEngine + ?Sized,
    P: ProgressSink + ?Sized,
{
    for pov in combos {
        if cancel.is_cancelled() {
            info!(
                operation = operation.name(),
                remaining = outcome.total - outcome.executed - outcome.skipped,
                "cancelled"
            );
            outcome.cancelled = true;
            break;
        }

        match execute_pov(&pov, operation, metadata, engine, progress)? {
            PovResult::Executed => outcome.executed += 1,
            PovResult::Skipped => outcome.skipped += 1,
        }

        if progress.iteration_complete() {
            outcome.stopped = true;
            break;
        }
    }
    Ok(())
}

fn execute_pov<M, E, P>(
    pov: &Pov<'_>,
    operation: Operation,
    metadata: &M,
    engine: &mut E,
    progress: &mut P,
) -> CubeResult<PovResult>
where
    M: MetadataService + ?Sized,
    E: CalcEngine + ?Sized,
    P: ProgressSink + ?Sized,
{
    let result = match operation {
        Operation::Allocate => {
            debug!(pov = %pov, "allocating");
            engine.allocate(pov)
        }
        Operation::Calculate { force } => {
            debug!(pov = %pov, force, "calculating");
            engine.calculate(pov, force)
        }
        Operation::Translate { force } => {
            debug!(pov = %pov, force, "translating");
            engine.translate(pov, force)
        }
        Operation::Consolidate { consolidation_type } => {
            // Status is read as-is; earlier POVs in this batch may have changed it.
            if consolidation_type == ConsolidationType::Impacted
                && !metadata.calc_status(pov)?.needs_consolidation()
            {
                debug!(pov = %pov, "consolidation not needed");
                return Ok(PovResult::Skipped);
            }

            debug!(pov = %pov, consolidation_type = consolidation_type.as_str(), "consolidating");
            progress.monitor_blocking_task();
            let result = engine.consolidate(pov, consolidation_type);
            progress.blocking_task_complete();
            result
        }
    };

    result.map_err(|source| CubeError::Engine {
        operation: operation.name().to_string(),
        pov: pov.to_string(),
        source,
    })?;
    Ok(PovResult::Executed)
}
