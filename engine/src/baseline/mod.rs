//! Signed project baselines
//!
//! A [`Baseline`] is the normalized, immutable snapshot that materialization
//! consumes. Upstream JSON arrives in several shapes and is turned into this
//! type exactly once by [`payload::BaselinePayload`]; everything downstream
//! works on the normalized form.

pub mod extract;
pub mod payload;

use crate::calendar::MAX_MONTH_INDEX;
use crate::errors::{Result, ValidationError, ValidationIssue};
use crate::ids::RawRubroId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub use extract::{
    BaselineSource, EstimateCounts, EstimateLine, LineKind, SelectedBaseline, estimate_counts,
    estimate_lines, has_estimates, select_baseline,
};
pub use payload::BaselinePayload;

/// Immutable, signed snapshot of a project's planned cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub baseline_id: String,
    pub project_id: String,
    #[serde(default)]
    pub client_name: String,
    pub currency: String,
    pub start_date: NaiveDate,
    pub duration_months: u32,
    pub signature_hash: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub labor_estimates: Vec<LaborEstimate>,
    #[serde(default)]
    pub non_labor_estimates: Vec<NonLaborEstimate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_indexation: Option<FxIndexation>,
}

/// A staffed role priced per month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborEstimate {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubro_id: Option<String>,
    pub fte_count: f64,
    pub monthly_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_month: Option<u32>,
}

/// Capital vs operating expense.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostNature {
    Capex,
    #[default]
    Opex,
}

/// A non-labor cost line. `amount` is monthly unless `one_time` is set, in
/// which case the whole amount lands in the first active month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonLaborEstimate {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubro_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub capex_or_opex: CostNature,
    #[serde(default)]
    pub one_time: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_month: Option<u32>,
}

/// Which estimate lines an indexation applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexationScope {
    Labor,
    NonLabor,
    #[default]
    All,
}

/// Optional currency conversion and annual indexation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxIndexation {
    /// Multiplier into the reporting currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_rate: Option<f64>,
    /// Percentage applied once per completed 12-month block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexation_pct_annual: Option<f64>,
    #[serde(default)]
    pub applies_to: IndexationScope,
}

impl Baseline {
    /// Active month range for an estimate line, defaulting to the full
    /// baseline duration.
    pub fn month_range(&self, start: Option<u32>, end: Option<u32>) -> RangeInclusive<u32> {
        start.unwrap_or(1)..=end.unwrap_or(self.duration_months)
    }

    /// Structural validation. Collects every issue before failing so a
    /// single round trip tells the caller everything that is wrong.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        require_text(&mut issues, "baseline_id", &self.baseline_id);
        require_text(&mut issues, "project_id", &self.project_id);
        require_text(&mut issues, "currency", &self.currency);
        require_text(&mut issues, "signature_hash", &self.signature_hash);

        let duration_ok = (1..=MAX_MONTH_INDEX).contains(&self.duration_months);
        if !duration_ok {
            issues.push(ValidationIssue::new(
                "duration_months",
                format!(
                    "must be between 1 and {MAX_MONTH_INDEX}, got {}",
                    self.duration_months
                ),
            ));
        }

        for (idx, item) in self.labor_estimates.iter().enumerate() {
            let path = format!("labor_estimates[{idx}]");
            if item.raw_rubro_id().is_none() {
                issues.push(ValidationIssue::new(
                    format!("{path}.role"),
                    "role or rubro_id is required",
                ));
            }
            require_amount(&mut issues, &format!("{path}.fte_count"), item.fte_count);
            require_amount(&mut issues, &format!("{path}.monthly_rate"), item.monthly_rate);
            if duration_ok {
                self.check_range(&mut issues, &path, item.start_month, item.end_month);
            }
        }

        for (idx, item) in self.non_labor_estimates.iter().enumerate() {
            let path = format!("non_labor_estimates[{idx}]");
            if item.raw_rubro_id().is_none() {
                issues.push(ValidationIssue::new(
                    format!("{path}.category"),
                    "category or rubro_id is required",
                ));
            }
            require_amount(&mut issues, &format!("{path}.amount"), item.amount);
            if duration_ok {
                self.check_range(&mut issues, &path, item.start_month, item.end_month);
            }
        }

        if let Some(fx) = &self.fx_indexation {
            if let Some(rate) = fx.fx_rate
                && !(rate.is_finite() && rate > 0.0)
            {
                issues.push(ValidationIssue::new(
                    "fx_indexation.fx_rate",
                    format!("must be a positive number, got {rate}"),
                ));
            }
            if let Some(pct) = fx.indexation_pct_annual
                && !(pct.is_finite() && pct > -100.0)
            {
                issues.push(ValidationIssue::new(
                    "fx_indexation.indexation_pct_annual",
                    format!("must be greater than -100, got {pct}"),
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                project_id: self.project_id.clone(),
                baseline_id: self.baseline_id.clone(),
                issues,
            }
            .into())
        }
    }

    fn check_range(
        &self,
        issues: &mut Vec<ValidationIssue>,
        path: &str,
        start: Option<u32>,
        end: Option<u32>,
    ) {
        let range = self.month_range(start, end);
        let (first, last) = (*range.start(), *range.end());
        if first < 1 || first > self.duration_months {
            issues.push(ValidationIssue::new(
                format!("{path}.start_month"),
                format!("must be between 1 and {}, got {first}", self.duration_months),
            ));
        }
        if last < 1 || last > self.duration_months {
            issues.push(ValidationIssue::new(
                format!("{path}.end_month"),
                format!("must be between 1 and {}, got {last}", self.duration_months),
            ));
        }
        if first > last {
            issues.push(ValidationIssue::new(
                format!("{path}.start_month"),
                format!("start month {first} is after end month {last}"),
            ));
        }
    }
}

fn require_text(issues: &mut Vec<ValidationIssue>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(field, "is required"));
    }
}

fn require_amount(issues: &mut Vec<ValidationIssue>, field: &str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        issues.push(ValidationIssue::new(
            field,
            format!("must be a non-negative number, got {value}"),
        ));
    }
}
