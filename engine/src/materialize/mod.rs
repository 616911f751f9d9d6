//! Baseline materialization
//!
//! Turns a signed baseline into allocation rows (one per canonical rubro per
//! month) and the project's rubro catalog, writing each row only if its
//! natural key is absent. Running the same baseline twice, or concurrently,
//! yields the same rows with the second run reporting everything skipped.
//!
//! Order of checks for every run:
//!
//! 1. no estimates: return `{0, 0, 0}` without touching the store
//! 2. structural validation: fail before any persistence
//! 3. plan rows, then write (or, for a dry run, compare against the store)

mod allocations;
mod rubros;
mod writer;

use crate::baseline::{Baseline, estimate_counts};
use crate::config::MaterializeConfig;
use crate::errors::Result;
use crate::retry::RetryPolicy;
use crate::store::{BatchWrite, FailedWrite, ItemKey, PlanStore};
use crate::taxonomy::Taxonomy;
use serde::Serialize;
use std::collections::BTreeSet;

pub use allocations::plan_allocations;
pub use rubros::plan_rubros;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterializeOptions {
    /// Count what would be written without persisting anything
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeStatus {
    NoEstimates,
    Completed,
    Partial,
    DryRun,
}

impl MaterializeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoEstimates => "no_estimates",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::DryRun => "dry_run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializeSummary {
    pub attempted: usize,
    pub written: usize,
    pub skipped: usize,
    pub status: MaterializeStatus,
    /// Rows that still failed after retries
    pub errors: Vec<FailedWrite>,
    /// Raw ids that did not resolve against the taxonomy
    pub unresolved_ids: Vec<String>,
}

impl MaterializeSummary {
    pub fn no_estimates() -> Self {
        Self {
            attempted: 0,
            written: 0,
            skipped: 0,
            status: MaterializeStatus::NoEstimates,
            errors: Vec::new(),
            unresolved_ids: Vec::new(),
        }
    }

    fn from_writes(attempted: usize, outcome: BatchWrite, unresolved_ids: Vec<String>) -> Self {
        let status = if outcome.failed.is_empty() {
            MaterializeStatus::Completed
        } else {
            MaterializeStatus::Partial
        };
        Self {
            attempted,
            written: outcome.written,
            skipped: outcome.skipped,
            status,
            errors: outcome.failed,
            unresolved_ids,
        }
    }

    fn dry_run(attempted: usize, existing: usize, unresolved_ids: Vec<String>) -> Self {
        Self {
            attempted,
            written: attempted - existing,
            skipped: existing,
            status: MaterializeStatus::DryRun,
            errors: Vec::new(),
            unresolved_ids,
        }
    }

    /// Rows were planned but the store neither wrote nor skipped any of them.
    ///
    /// Never true for an empty baseline or a rerun, so callers can tell a
    /// broken write path apart from both.
    pub fn is_write_path_fault(&self) -> bool {
        self.attempted > 0 && self.written == 0 && self.skipped == 0
    }
}

/// Materializes one baseline at a time against a plan store.
pub struct Materializer<'a, S: PlanStore + ?Sized> {
    store: &'a S,
    taxonomy: &'a Taxonomy,
    batch_size: usize,
    retry: RetryPolicy,
}

impl<'a, S: PlanStore + ?Sized> Materializer<'a, S> {
    pub fn new(store: &'a S, taxonomy: &'a Taxonomy) -> Self {
        Self::with_config(store, taxonomy, &MaterializeConfig::default())
    }

    pub fn with_config(store: &'a S, taxonomy: &'a Taxonomy, cfg: &MaterializeConfig) -> Self {
        Self {
            store,
            taxonomy,
            batch_size: cfg.batch_size.max(1),
            retry: RetryPolicy::from_config(cfg),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Shared preamble. `false` means there is nothing to do.
    fn precheck(&self, baseline: &Baseline, what: &'static str) -> Result<bool> {
        let counts = estimate_counts(baseline);
        if counts.total == 0 {
            tracing::info!(
                project_id = %baseline.project_id,
                baseline_id = %baseline.baseline_id,
                what,
                outcome = "no_estimates",
                "baseline has no estimates, nothing to materialize"
            );
            return Ok(false);
        }
        baseline.validate()?;
        tracing::debug!(
            project_id = %baseline.project_id,
            baseline_id = %baseline.baseline_id,
            what,
            labor = counts.labor_count,
            non_labor = counts.non_labor_count,
            "materializing baseline"
        );
        Ok(true)
    }

    /// Write planned rows (or compare them for a dry run) and log the outcome.
    #[allow(clippy::too_many_arguments)]
    fn persist<T: Clone>(
        &self,
        baseline: &Baseline,
        what: &'static str,
        rows: &[T],
        unresolved_ids: Vec<String>,
        key_prefix: String,
        options: MaterializeOptions,
        key_of: impl Fn(&T) -> ItemKey,
        write: impl Fn(&[T]) -> Result<BatchWrite>,
    ) -> Result<MaterializeSummary> {
        let attempted = rows.len();

        if options.dry_run {
            let owner = crate::store::keys::project_key(&baseline.project_id);
            let existing: BTreeSet<String> = self.store.existing_item_keys(&owner, &key_prefix)?;
            let already = rows
                .iter()
                .filter(|row| existing.contains(&key_of(*row).item))
                .count();
            let summary = MaterializeSummary::dry_run(attempted, already, unresolved_ids);
            tracing::info!(
                project_id = %baseline.project_id,
                baseline_id = %baseline.baseline_id,
                what,
                attempted,
                would_write = summary.written,
                would_skip = summary.skipped,
                "dry run"
            );
            return Ok(summary);
        }

        let outcome = writer::write_in_chunks(rows, self.batch_size, &self.retry, &key_of, write)
            .inspect_err(|e| {
                tracing::error!(
                    project_id = %baseline.project_id,
                    baseline_id = %baseline.baseline_id,
                    what,
                    category = e.category().as_str(),
                    error = %e,
                    "store rejected batch write"
                );
            })?;
        let summary = MaterializeSummary::from_writes(attempted, outcome, unresolved_ids);

        if summary.status == MaterializeStatus::Partial {
            for failed in &summary.errors {
                tracing::error!(
                    project_id = %baseline.project_id,
                    baseline_id = %baseline.baseline_id,
                    key = %failed.key,
                    reason = %failed.reason,
                    "row not written after retries"
                );
            }
        }
        tracing::info!(
            project_id = %baseline.project_id,
            baseline_id = %baseline.baseline_id,
            what,
            attempted,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.errors.len(),
            outcome = summary.status.as_str(),
            "materialization finished"
        );
        Ok(summary)
    }
}

/// Sorted, de-duplicated raw ids of lines the taxonomy did not resolve.
fn unresolved_ids(lines: &[crate::baseline::EstimateLine]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !line.resolution.found)
        .map(|line| line.raw_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
