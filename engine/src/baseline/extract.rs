//! Estimate counting, copy selection and line flattening.

use super::{Baseline, IndexationScope};
use crate::ids::RawRubroId;
use crate::records::round_cents;
use crate::taxonomy::{Resolution, Taxonomy};
use serde::Serialize;
use std::ops::RangeInclusive;

/// Number of estimate items on a baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EstimateCounts {
    pub labor_count: usize,
    pub non_labor_count: usize,
    pub total: usize,
}

pub fn estimate_counts(baseline: &Baseline) -> EstimateCounts {
    let labor_count = baseline.labor_estimates.len();
    let non_labor_count = baseline.non_labor_estimates.len();
    EstimateCounts {
        labor_count,
        non_labor_count,
        total: labor_count + non_labor_count,
    }
}

/// `false` is a valid terminal state: there is nothing to materialize.
pub fn has_estimates(baseline: &Baseline) -> bool {
    estimate_counts(baseline).total > 0
}

/// Which stored copy of a baseline was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    Summary,
    Detail,
}

impl BaselineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Detail => "detail",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedBaseline {
    pub baseline: Baseline,
    pub source: BaselineSource,
    pub populated: bool,
    /// Both copies were equally populated (or equally empty) and the fixed
    /// summary-first order decided.
    pub tie_broken: bool,
    pub counts: EstimateCounts,
}

/// Choose between the summary and detail copies of the same baseline.
///
/// A copy with estimates beats one without. When both or neither have
/// estimates the summary copy wins. Returns `None` when neither exists.
pub fn select_baseline(
    summary: Option<Baseline>,
    detail: Option<Baseline>,
) -> Option<SelectedBaseline> {
    let tagged = |baseline: Baseline, source: BaselineSource, tie_broken: bool| {
        let counts = estimate_counts(&baseline);
        SelectedBaseline {
            baseline,
            source,
            populated: counts.total > 0,
            tie_broken,
            counts,
        }
    };

    let selected = match (summary, detail) {
        (None, None) => return None,
        (Some(summary), None) => tagged(summary, BaselineSource::Summary, false),
        (None, Some(detail)) => tagged(detail, BaselineSource::Detail, false),
        (Some(summary), Some(detail)) => {
            match (has_estimates(&summary), has_estimates(&detail)) {
                (false, true) => tagged(detail, BaselineSource::Detail, false),
                (true, false) => tagged(summary, BaselineSource::Summary, false),
                _ => tagged(summary, BaselineSource::Summary, true),
            }
        }
    };

    if selected.tie_broken {
        tracing::warn!(
            project_id = %selected.baseline.project_id,
            baseline_id = %selected.baseline.baseline_id,
            populated = selected.populated,
            "ambiguous baseline copies, using summary copy"
        );
    }
    Some(selected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Labor,
    NonLabor,
}

/// One estimate item flattened to what materialization needs.
#[derive(Debug, Clone)]
pub struct EstimateLine {
    pub kind: LineKind,
    /// Index within its estimate list
    pub position: usize,
    pub raw_id: String,
    pub resolution: Resolution,
    pub description: Option<String>,
    pub months: RangeInclusive<u32>,
    /// Monthly amount, or the whole amount for one-time items
    pub base_amount: f64,
    pub one_time: bool,
    pub fx_rate: f64,
    pub indexation_pct: f64,
}

impl EstimateLine {
    /// Months that receive an allocation.
    pub fn active_months(&self) -> RangeInclusive<u32> {
        if self.one_time {
            *self.months.start()..=*self.months.start()
        } else {
            self.months.clone()
        }
    }

    /// Amount for `month_index`, in the reporting currency, rounded to cents.
    /// Zero outside the active months.
    pub fn amount_for(&self, month_index: u32) -> f64 {
        if !self.active_months().contains(&month_index) {
            return 0.0;
        }
        let steps = (month_index - 1) / 12;
        let factor = (1.0 + self.indexation_pct / 100.0).powi(steps as i32);
        round_cents(self.base_amount * self.fx_rate * factor)
    }
}

/// Flatten a baseline into canonicalized lines, labor first.
///
/// Each raw id passes through the taxonomy exactly once here.
pub fn estimate_lines(baseline: &Baseline, taxonomy: &Taxonomy) -> Vec<EstimateLine> {
    let fx = baseline.fx_indexation.as_ref();
    let fx_rate = fx.and_then(|f| f.fx_rate).unwrap_or(1.0);
    let indexation_for = |kind: LineKind| {
        let Some(fx) = fx else { return 0.0 };
        let applies = match fx.applies_to {
            IndexationScope::All => true,
            IndexationScope::Labor => kind == LineKind::Labor,
            IndexationScope::NonLabor => kind == LineKind::NonLabor,
        };
        if applies {
            fx.indexation_pct_annual.unwrap_or(0.0)
        } else {
            0.0
        }
    };

    let labor = baseline
        .labor_estimates
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let raw_id = item.raw_rubro_id().unwrap_or_default().to_string();
            EstimateLine {
                kind: LineKind::Labor,
                position,
                resolution: taxonomy.canonicalize(&raw_id),
                raw_id,
                description: Some(item.role.trim().to_string()).filter(|r| !r.is_empty()),
                months: baseline.month_range(item.start_month, item.end_month),
                base_amount: item.fte_count * item.monthly_rate,
                one_time: false,
                fx_rate,
                indexation_pct: indexation_for(LineKind::Labor),
            }
        });

    let non_labor = baseline
        .non_labor_estimates
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let raw_id = item.raw_rubro_id().unwrap_or_default().to_string();
            EstimateLine {
                kind: LineKind::NonLabor,
                position,
                resolution: taxonomy.canonicalize(&raw_id),
                raw_id,
                description: item.description.clone(),
                months: baseline.month_range(item.start_month, item.end_month),
                base_amount: item.amount,
                one_time: item.one_time,
                fx_rate,
                indexation_pct: indexation_for(LineKind::NonLabor),
            }
        });

    labor.chain(non_labor).collect()
}
