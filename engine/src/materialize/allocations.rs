//! Allocation rows: one per canonical rubro per month.

use super::{MaterializeOptions, MaterializeSummary, Materializer, unresolved_ids};
use crate::baseline::{Baseline, EstimateLine, estimate_lines};
use crate::calendar::calendar_month_for;
use crate::errors::Result;
use crate::records::{Allocation, SOURCE_MATERIALIZER, round_cents};
use crate::store::{ItemKey, PlanStore, keys};
use crate::taxonomy::Taxonomy;
use std::collections::BTreeMap;

/// Allocation rows for a baseline, ordered by (rubro_id, month_index).
///
/// Lines that resolve to the same canonical rubro are summed per month.
pub fn plan_allocations(baseline: &Baseline, taxonomy: &Taxonomy) -> Result<Vec<Allocation>> {
    let lines = estimate_lines(baseline, taxonomy);
    plan_from_lines(baseline, &lines)
}

fn plan_from_lines(baseline: &Baseline, lines: &[EstimateLine]) -> Result<Vec<Allocation>> {
    let mut cells: BTreeMap<(&str, u32), f64> = BTreeMap::new();
    for line in lines {
        for month_index in line.active_months() {
            *cells
                .entry((line.resolution.canonical_id.as_str(), month_index))
                .or_default() += line.amount_for(month_index);
        }
    }

    cells
        .into_iter()
        .map(|((rubro_id, month_index), amount)| {
            Ok(Allocation {
                project_id: baseline.project_id.clone(),
                baseline_id: baseline.baseline_id.clone(),
                rubro_id: rubro_id.to_string(),
                month_index,
                calendar_month: calendar_month_for(baseline.start_date, month_index)?,
                amount: round_cents(amount),
                source: SOURCE_MATERIALIZER.to_string(),
            })
        })
        .collect()
}

impl<S: PlanStore + ?Sized> Materializer<'_, S> {
    /// Write the baseline's allocations if absent.
    pub fn materialize_allocations(
        &self,
        baseline: &Baseline,
        options: MaterializeOptions,
    ) -> Result<MaterializeSummary> {
        if !self.precheck(baseline, "allocations")? {
            return Ok(MaterializeSummary::no_estimates());
        }

        let lines = estimate_lines(baseline, self.taxonomy);
        let rows = plan_from_lines(baseline, &lines)?;

        self.persist(
            baseline,
            "allocations",
            &rows,
            unresolved_ids(&lines),
            keys::allocation_prefix(&baseline.baseline_id),
            options,
            ItemKey::for_allocation,
            |chunk| self.store.put_allocations_if_absent(chunk),
        )
    }
}
