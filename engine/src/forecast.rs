//! Forecast grid
//!
//! Read-only merge of planned allocations, forecast overrides and actual
//! spend into one cell per (rubro, month):
//!
//! ```text
//! planned  = allocation amount, or 0
//! forecast = override, or planned
//! actual   = sum of actuals, or 0
//! variance = forecast - actual
//! ```
//!
//! Override and actual ids arrive raw and are canonicalized here, once per
//! distinct id. Allocation ids are already canonical.

use crate::baseline::Baseline;
use crate::calendar::{YearMonth, calendar_month_for, check_month_index, month_index_for};
use crate::errors::{FinzError, Result};
use crate::records::{ActualSpend, Allocation, ForecastOverride, Period, round_cents};
use crate::store::PlanStore;
use crate::taxonomy::Taxonomy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct ForecastQuery {
    pub project_id: String,
    /// Latest recorded baseline when `None`
    pub baseline_id: Option<String>,
    /// Grid covers months `1..=months`
    pub months: u32,
    pub omit_zero_rows: bool,
}

impl ForecastQuery {
    pub fn new(project_id: impl Into<String>, months: u32) -> Self {
        Self {
            project_id: project_id.into(),
            baseline_id: None,
            months,
            omit_zero_rows: true,
        }
    }

    pub fn baseline(mut self, baseline_id: impl Into<String>) -> Self {
        self.baseline_id = Some(baseline_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastCell {
    pub rubro_id: String,
    pub month_index: u32,
    pub calendar_month: YearMonth,
    pub planned: f64,
    pub forecast: f64,
    pub actual: f64,
    pub variance: f64,
    /// The forecast came from an override rather than the plan
    pub overridden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastDiagnostics {
    /// Raw override/actual ids the taxonomy did not resolve
    pub unresolved_ids: Vec<String>,
    /// Actuals whose period falls outside the grid
    pub actuals_out_of_range: usize,
    pub overrides_out_of_range: usize,
    pub omitted_zero_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastGrid {
    pub project_id: String,
    pub baseline_id: String,
    pub currency: String,
    pub months: u32,
    pub cells: Vec<ForecastCell>,
    pub diagnostics: ForecastDiagnostics,
}

/// Per-month totals across rubros (cashflow view).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month_index: u32,
    pub calendar_month: YearMonth,
    pub planned: f64,
    pub forecast: f64,
    pub actual: f64,
    pub variance: f64,
}

/// Canonicalizes each distinct raw id once and remembers the misses.
struct IdResolver<'a> {
    taxonomy: &'a Taxonomy,
    seen: HashMap<String, String>,
    unresolved: BTreeSet<String>,
}

impl<'a> IdResolver<'a> {
    fn new(taxonomy: &'a Taxonomy) -> Self {
        Self {
            taxonomy,
            seen: HashMap::new(),
            unresolved: BTreeSet::new(),
        }
    }

    fn canonical(&mut self, raw_id: &str) -> String {
        if let Some(id) = self.seen.get(raw_id) {
            return id.clone();
        }
        let resolution = self.taxonomy.canonicalize(raw_id);
        if !resolution.found {
            self.unresolved.insert(raw_id.trim().to_string());
        }
        self.seen
            .insert(raw_id.to_string(), resolution.canonical_id.clone());
        resolution.canonical_id
    }
}

/// Merge the three inputs into grid cells for months `1..=months`.
///
/// Cells are ordered by (rubro_id, month_index).
pub fn merge_forecast(
    baseline: &Baseline,
    months: u32,
    allocations: &[Allocation],
    overrides: &[ForecastOverride],
    actuals: &[ActualSpend],
    taxonomy: &Taxonomy,
    omit_zero_rows: bool,
) -> Result<(Vec<ForecastCell>, ForecastDiagnostics)> {
    check_month_index(months)?;
    let mut diagnostics = ForecastDiagnostics::default();
    let mut resolver = IdResolver::new(taxonomy);

    let mut planned: BTreeMap<(String, u32), f64> = BTreeMap::new();
    for row in allocations.iter().filter(|row| row.month_index <= months) {
        *planned
            .entry((row.rubro_id.clone(), row.month_index))
            .or_default() += row.amount;
    }

    let mut overridden: BTreeMap<(String, u32), (f64, DateTime<Utc>)> = BTreeMap::new();
    for row in overrides {
        if row.month_index == 0 || row.month_index > months {
            diagnostics.overrides_out_of_range += 1;
            continue;
        }
        let key = (resolver.canonical(&row.rubro_id), row.month_index);
        let newer = overridden
            .get(&key)
            .is_none_or(|(_, existing_at)| *existing_at <= row.updated_at);
        if newer {
            overridden.insert(key, (row.amount, row.updated_at));
        }
    }

    let mut actual: BTreeMap<(String, u32), f64> = BTreeMap::new();
    for row in actuals {
        let month_index = match row.period {
            Period::Index(idx) => Some(idx),
            Period::Calendar(month) => month_index_for(baseline.start_date, month),
        };
        let Some(month_index) = month_index.filter(|idx| (1..=months).contains(idx)) else {
            tracing::debug!(
                project_id = %row.project_id,
                external_ref = %row.external_ref,
                period = %row.period,
                "actual outside forecast window"
            );
            diagnostics.actuals_out_of_range += 1;
            continue;
        };
        *actual
            .entry((resolver.canonical(&row.rubro_id), month_index))
            .or_default() += row.amount;
    }

    let keys: BTreeSet<&(String, u32)> = planned
        .keys()
        .chain(overridden.keys())
        .chain(actual.keys())
        .collect();

    let mut cells = Vec::with_capacity(keys.len());
    for key in keys {
        let planned_amount = round_cents(planned.get(key).copied().unwrap_or(0.0));
        let override_amount = overridden.get(key).map(|(amount, _)| round_cents(*amount));
        let forecast = override_amount.unwrap_or(planned_amount);
        let actual_amount = round_cents(actual.get(key).copied().unwrap_or(0.0));

        if omit_zero_rows && planned_amount == 0.0 && forecast == 0.0 && actual_amount == 0.0 {
            diagnostics.omitted_zero_rows += 1;
            continue;
        }

        let (rubro_id, month_index) = key;
        cells.push(ForecastCell {
            rubro_id: rubro_id.clone(),
            month_index: *month_index,
            calendar_month: calendar_month_for(baseline.start_date, *month_index)?,
            planned: planned_amount,
            forecast,
            actual: actual_amount,
            variance: round_cents(forecast - actual_amount),
            overridden: override_amount.is_some(),
        });
    }

    diagnostics.unresolved_ids = resolver.unresolved.into_iter().collect();
    Ok((cells, diagnostics))
}

/// Build the forecast grid for a project from what the store holds.
pub fn compute_forecast_grid<S: PlanStore + ?Sized>(
    store: &S,
    taxonomy: &Taxonomy,
    query: &ForecastQuery,
) -> Result<ForecastGrid> {
    check_month_index(query.months)?;

    let baseline = match &query.baseline_id {
        Some(baseline_id) => store
            .baseline(&query.project_id, baseline_id)?
            .ok_or_else(|| {
                FinzError::not_found(format!(
                    "baseline {baseline_id} for project {}",
                    query.project_id
                ))
            })?,
        None => store.latest_baseline(&query.project_id)?.ok_or_else(|| {
            FinzError::not_found(format!("no baseline recorded for project {}", query.project_id))
        })?,
    };

    let allocations = store.allocations(&baseline.project_id, &baseline.baseline_id)?;
    let overrides = store.forecast_overrides(&baseline.project_id)?;
    let actuals = store.actuals(&baseline.project_id)?;

    let (cells, diagnostics) = merge_forecast(
        &baseline,
        query.months,
        &allocations,
        &overrides,
        &actuals,
        taxonomy,
        query.omit_zero_rows,
    )?;

    tracing::info!(
        project_id = %baseline.project_id,
        baseline_id = %baseline.baseline_id,
        months = query.months,
        cells = cells.len(),
        unresolved = diagnostics.unresolved_ids.len(),
        actuals_out_of_range = diagnostics.actuals_out_of_range,
        "forecast grid computed"
    );

    Ok(ForecastGrid {
        project_id: baseline.project_id,
        baseline_id: baseline.baseline_id,
        currency: baseline.currency,
        months: query.months,
        cells,
        diagnostics,
    })
}

/// Totals per month, ordered by month index.
pub fn summarize_by_month(cells: &[ForecastCell]) -> Vec<MonthTotal> {
    let mut totals: BTreeMap<u32, MonthTotal> = BTreeMap::new();
    for cell in cells {
        let total = totals.entry(cell.month_index).or_insert_with(|| MonthTotal {
            month_index: cell.month_index,
            calendar_month: cell.calendar_month,
            planned: 0.0,
            forecast: 0.0,
            actual: 0.0,
            variance: 0.0,
        });
        total.planned += cell.planned;
        total.forecast += cell.forecast;
        total.actual += cell.actual;
        total.variance += cell.variance;
    }
    totals
        .into_values()
        .map(|mut total| {
            total.planned = round_cents(total.planned);
            total.forecast = round_cents(total.forecast);
            total.actual = round_cents(total.actual);
            total.variance = round_cents(total.variance);
            total
        })
        .collect()
}
