//! Baseline handoff
//!
//! Accepting a signed baseline into the finance side means: validate it,
//! record it, then materialize the rubro catalog and the allocations. The
//! handoff is blocked when a baseline with estimates did not fully land.

use crate::baseline::Baseline;
use crate::errors::{FinzError, Result};
use crate::materialize::{MaterializeOptions, MaterializeStatus, MaterializeSummary, Materializer};
use crate::store::PlanStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffReport {
    pub project_id: String,
    pub baseline_id: String,
    /// `false` when the baseline was already recorded, or on a dry run
    pub baseline_recorded: bool,
    pub rubros: MaterializeSummary,
    pub allocations: MaterializeSummary,
}

impl HandoffReport {
    /// Every estimate id resolved against the taxonomy.
    pub fn is_clean(&self) -> bool {
        self.rubros.unresolved_ids.is_empty() && self.allocations.unresolved_ids.is_empty()
    }
}

/// Why a materialization summary blocks the handoff, if it does.
fn blocking_reason(what: &str, summary: &MaterializeSummary) -> Option<String> {
    if summary.status == MaterializeStatus::DryRun {
        return None;
    }
    if summary.is_write_path_fault() {
        return Some(format!(
            "{what}: {} rows planned but none written or skipped",
            summary.attempted
        ));
    }
    if summary.status == MaterializeStatus::Partial {
        let first = summary
            .errors
            .first()
            .map(|f| format!(" (first: {})", f.key))
            .unwrap_or_default();
        return Some(format!(
            "{what}: {} of {} rows failed{first}",
            summary.errors.len(),
            summary.attempted
        ));
    }
    None
}

/// Run the handoff with an already-configured materializer.
pub fn run_handoff<S: PlanStore + ?Sized>(
    store: &S,
    materializer: &Materializer<'_, S>,
    baseline: &Baseline,
    options: MaterializeOptions,
) -> Result<HandoffReport> {
    baseline.validate()?;

    let baseline_recorded = if options.dry_run {
        false
    } else {
        store.put_baseline_if_absent(baseline)?
    };

    let rubros = materializer.materialize_rubros(baseline, options)?;
    if let Some(reason) = blocking_reason("rubros", &rubros) {
        return Err(blocked(baseline, reason));
    }

    let allocations = materializer.materialize_allocations(baseline, options)?;
    if let Some(reason) = blocking_reason("allocations", &allocations) {
        return Err(blocked(baseline, reason));
    }

    tracing::info!(
        project_id = %baseline.project_id,
        baseline_id = %baseline.baseline_id,
        baseline_recorded,
        rubros_written = rubros.written,
        allocations_written = allocations.written,
        allocations_skipped = allocations.skipped,
        dry_run = options.dry_run,
        "baseline handoff accepted"
    );

    Ok(HandoffReport {
        project_id: baseline.project_id.clone(),
        baseline_id: baseline.baseline_id.clone(),
        baseline_recorded,
        rubros,
        allocations,
    })
}

fn blocked(baseline: &Baseline, reason: String) -> FinzError {
    tracing::error!(
        project_id = %baseline.project_id,
        baseline_id = %baseline.baseline_id,
        %reason,
        "baseline handoff blocked"
    );
    FinzError::handoff(&baseline.project_id, &baseline.baseline_id, reason)
}
