//! Persisted key shapes
//!
//! Every record lives under an owner key (`PROJECT#{project_id}`) and an
//! item key that encodes its natural key. Write-if-absent operates on the
//! pair, so the item key must contain every field of the natural key.
//!
//! Ids are free text (unresolved rubro ids are kept as written), so each
//! segment is escaped with [`segment`] before joining on `#`.

use crate::records::{ActualSpend, Allocation, ForecastOverride, Period, Rubro};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

pub const PROJECT_PREFIX: &str = "PROJECT#";
pub const BASELINE_PREFIX: &str = "BASELINE#";
pub const ALLOCATION_PREFIX: &str = "ALLOC#";
pub const RUBRO_PREFIX: &str = "RUBRO#";
pub const FORECAST_PREFIX: &str = "FORECAST#";
pub const ACTUAL_PREFIX: &str = "ACTUAL#";

/// `(owner_key, item_key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ItemKey {
    pub owner: String,
    pub item: String,
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.item)
    }
}

/// Escape one key segment so a `#` inside an id cannot forge a separator.
pub fn segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['#', '%']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '#' => escaped.push_str("%23"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

pub fn project_key(project_id: &str) -> String {
    format!("{PROJECT_PREFIX}{}", segment(project_id))
}

pub fn baseline_key(baseline_id: &str) -> String {
    format!("{BASELINE_PREFIX}{}", segment(baseline_id))
}

pub fn allocation_key(baseline_id: &str, rubro_id: &str, month_index: u32) -> String {
    format!(
        "{}{}#M{month_index}",
        allocation_prefix(baseline_id),
        segment(rubro_id)
    )
}

/// Prefix shared by every allocation of one baseline.
pub fn allocation_prefix(baseline_id: &str) -> String {
    format!("{ALLOCATION_PREFIX}{}#", segment(baseline_id))
}

pub fn rubro_key(baseline_id: &str, rubro_id: &str) -> String {
    format!("{}{}", rubro_prefix(baseline_id), segment(rubro_id))
}

pub fn rubro_prefix(baseline_id: &str) -> String {
    format!("{RUBRO_PREFIX}{}#", segment(baseline_id))
}

pub fn forecast_key(rubro_id: &str, month_index: u32) -> String {
    format!("{FORECAST_PREFIX}{}#M{month_index}", segment(rubro_id))
}

/// One invoice or payroll run covers many lines, so the reference alone
/// does not identify a spend record.
pub fn actual_key(source: &str, external_ref: &str, rubro_id: &str, period: &Period) -> String {
    format!(
        "{ACTUAL_PREFIX}{source}#{}#{}#{period}",
        segment(external_ref),
        segment(rubro_id)
    )
}

impl ItemKey {
    pub fn new(owner: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            item: item.into(),
        }
    }

    pub fn for_allocation(row: &Allocation) -> Self {
        Self::new(
            project_key(&row.project_id),
            allocation_key(&row.baseline_id, &row.rubro_id, row.month_index),
        )
    }

    pub fn for_rubro(row: &Rubro) -> Self {
        Self::new(
            project_key(&row.project_id),
            rubro_key(&row.baseline_id, &row.canonical_rubro_id),
        )
    }

    pub fn for_override(row: &ForecastOverride) -> Self {
        Self::new(
            project_key(&row.project_id),
            forecast_key(&row.rubro_id, row.month_index),
        )
    }

    pub fn for_actual(row: &ActualSpend) -> Self {
        Self::new(
            project_key(&row.project_id),
            actual_key(
                row.source.as_str(),
                &row.external_ref,
                &row.rubro_id,
                &row.period,
            ),
        )
    }
}
