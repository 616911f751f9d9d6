//! Plan store
//!
//! Persistence seam for baselines, materialized records and collaborator
//! inputs. The only write primitive the materializers rely on is
//! write-if-absent on the full natural key: racing writers of the same key
//! produce one logical write and see the rest as skips.

pub mod keys;
pub mod sqlite;

use crate::baseline::Baseline;
use crate::errors::Result;
use crate::records::{ActualSpend, Allocation, ForecastOverride, Rubro};
use serde::Serialize;
use std::collections::BTreeSet;

pub use keys::ItemKey;
pub use sqlite::SqliteStore;

/// One row the store could not write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    pub key: ItemKey,
    pub reason: String,
}

/// Outcome of one conditional batch write.
///
/// Per-row failures land in `failed`; the call itself only errors when the
/// batch as a whole could not be attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWrite {
    pub written: usize,
    pub skipped: usize,
    pub failed: Vec<FailedWrite>,
}

impl BatchWrite {
    pub fn merge(&mut self, other: BatchWrite) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
    }
}

pub trait PlanStore: Send + Sync {
    /// Record a baseline. Returns `false` when it was already recorded.
    fn put_baseline_if_absent(&self, baseline: &Baseline) -> Result<bool>;

    fn baseline(&self, project_id: &str, baseline_id: &str) -> Result<Option<Baseline>>;

    /// Most recently recorded baseline for a project.
    fn latest_baseline(&self, project_id: &str) -> Result<Option<Baseline>>;

    fn put_allocations_if_absent(&self, rows: &[Allocation]) -> Result<BatchWrite>;

    fn put_rubros_if_absent(&self, rows: &[Rubro]) -> Result<BatchWrite>;

    /// Item keys under `owner` starting with `prefix`.
    fn existing_item_keys(&self, owner: &str, prefix: &str) -> Result<BTreeSet<String>>;

    fn allocations(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Allocation>>;

    fn rubros(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Rubro>>;

    /// Insert or replace the override for its (project, rubro, month).
    fn put_forecast_override(&self, row: &ForecastOverride) -> Result<()>;

    fn forecast_overrides(&self, project_id: &str) -> Result<Vec<ForecastOverride>>;

    /// Record an actual. Returns `false` when the same line of the same
    /// reference (rubro and period included) was seen before.
    fn put_actual_if_absent(&self, row: &ActualSpend) -> Result<bool>;

    fn actuals(&self, project_id: &str) -> Result<Vec<ActualSpend>>;
}
