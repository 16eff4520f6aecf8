use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::{
    ConsolidateArgs, ForcedOperationArgs, OperationArgs, RunArgs, StoreArgs,
    default_manifest_path,
};
use crate::engine::JournalEngine;
use crate::error::CubeError;
use crate::metadata::SqliteMetadata;
use crate::model::{OperationOptions, RunManifest};
use crate::progress::{CancelToken, LogProgress};
use crate::session::Session;
use crate::slice::AxisSpecs;
use crate::store::open_store;
use crate::subcube::{Operation, SubcubeOutcome, check_axes, run_subcube_operation};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

const MANIFEST_VERSION: u32 = 1;

pub fn run_allocate(store: &StoreArgs, args: OperationArgs) -> Result<()> {
    execute(store, Operation::Allocate, &args.axis_specs(), &args.run)
}

pub fn run_calculate(store: &StoreArgs, args: ForcedOperationArgs) -> Result<()> {
    let operation = Operation::Calculate { force: args.force };
    execute(
        store,
        operation,
        &args.operation.axis_specs(),
        &args.operation.run,
    )
}

pub fn run_translate(store: &StoreArgs, args: ForcedOperationArgs) -> Result<()> {
    let operation = Operation::Translate { force: args.force };
    execute(
        store,
        operation,
        &args.operation.axis_specs(),
        &args.operation.run,
    )
}

pub fn run_consolidate(store: &StoreArgs, args: ConsolidateArgs) -> Result<()> {
    let operation = Operation::Consolidate {
        consolidation_type: args.consolidation_type,
    };
    execute(store, operation, &args.axes.axis_specs(), &args.run)
}

fn execute(store: &StoreArgs, operation: Operation, specs: &AxisSpecs, run: &RunArgs) -> Result<()> {
    let started = Utc::now();
    let run_id = utc_compact_string(started);
    let db_path = store.resolved_db_path();
    let connection = open_store(&db_path)?;

    let cancel = CancelToken::new();
    if !run.dry_run {
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || handler_token.cancel())
            .context("failed to install interrupt handler")?;
    }

    info!(
        run_id = %run_id,
        operation = operation.name(),
        dry_run = run.dry_run,
        "subcube run starting"
    );
    let (outcome, result) = perform(&connection, operation, specs, run, &run_id, &cancel);

    let manifest = RunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        operation: operation.name().to_string(),
        status: run_status(&outcome, &result, run.dry_run).to_string(),
        started_at: started.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        finished_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        options: operation_options(operation, run),
        member_specs: member_specs(specs),
        outcome,
        failure_reason: result.as_ref().err().map(|err| format!("{err:#}")),
    };

    let manifest_path = run
        .manifest_path
        .clone()
        .unwrap_or_else(|| default_manifest_path(&store.manifest_dir(), operation.name(), &run_id));
    write_manifest(&manifest_path, &manifest)?;

    result?;
    if outcome.cancelled {
        warn!(
            run_id = %run_id,
            executed = outcome.executed,
            remaining = outcome.total - outcome.executed - outcome.skipped,
            "run cancelled before all POVs were processed"
        );
    }
    Ok(())
}

/// Resolves the slice and drives the operation. The outcome is returned
/// alongside any error so a failed run still reports its size.
fn perform(
    connection: &Connection,
    operation: Operation,
    specs: &AxisSpecs,
    run: &RunArgs,
    run_id: &str,
    cancel: &CancelToken,
) -> (SubcubeOutcome, Result<()>) {
    let metadata = SqliteMetadata::new(connection);
    let slice = match Session::new(&metadata).and_then(|mut session| session.build_slice(specs)) {
        Ok(slice) => slice,
        Err(err) => {
            let message = if err.is_specification_error() {
                "invalid member specification"
            } else {
                "failed to resolve member specifications"
            };
            return (SubcubeOutcome::default(), Err(anyhow::Error::new(err).context(message)));
        }
    };

    let combos = slice.combos();
    if combos.is_empty() {
        warn!(operation = operation.name(), "slice produced no POVs");
    }
    let mut outcome = SubcubeOutcome {
        total: combos.len(),
        ..SubcubeOutcome::default()
    };

    if let Err(err) = check_axes(&slice, operation) {
        return (outcome, Err(err.into()));
    }

    if run.dry_run {
        info!(
            operation = operation.name(),
            povs = outcome.total,
            "dry-run: engine not called"
        );
        return (outcome, Ok(()));
    }

    let mut engine = JournalEngine::new(connection, run_id);
    let mut progress = LogProgress::new(
        run.max_povs,
        run.stall_warn_secs.map(|secs| Duration::from_secs(secs.get())),
    );
    match run_subcube_operation(&slice, operation, &metadata, &mut engine, &mut progress, cancel) {
        Ok(finished) => (finished, Ok(())),
        Err(err) => {
            if let CubeError::Aborted { outcome: partial, .. } = &err {
                outcome = *partial;
            }
            (outcome, Err(err.into()))
        }
    }
}

fn run_status(outcome: &SubcubeOutcome, result: &Result<()>, dry_run: bool) -> &'static str {
    if result.is_err() {
        "failed"
    } else if dry_run {
        "dry_run"
    } else if outcome.cancelled {
        "cancelled"
    } else if outcome.stopped {
        "stopped"
    } else {
        "completed"
    }
}

fn operation_options(operation: Operation, run: &RunArgs) -> OperationOptions {
    let (force, consolidation_type) = match operation {
        Operation::Allocate => (None, None),
        Operation::Calculate { force } | Operation::Translate { force } => (Some(force), None),
        Operation::Consolidate { consolidation_type } => (None, Some(consolidation_type)),
    };
    OperationOptions {
        force,
        consolidation_type,
        max_povs: run.max_povs.map(NonZeroUsize::get),
        dry_run: run.dry_run,
    }
}

fn member_specs(specs: &AxisSpecs) -> BTreeMap<String, Vec<String>> {
    specs
        .iter()
        .map(|(axis, values)| (axis.dimension_name().to_string(), values.to_vec()))
        .collect()
}

fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    write_json_pretty(path, manifest)
        .with_context(|| format!("failed to write run manifest {}", path.display()))?;
    info!(path = %path.display(), status = %manifest.status, "wrote run manifest");
    Ok(())
}
