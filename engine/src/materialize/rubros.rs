//! Project rubro catalog derived from a baseline.

use super::{MaterializeOptions, MaterializeSummary, Materializer, unresolved_ids};
use crate::baseline::{Baseline, EstimateLine, estimate_lines};
use crate::errors::Result;
use crate::records::{Rubro, SOURCE_MATERIALIZER};
use crate::store::{ItemKey, PlanStore, keys};
use crate::taxonomy::Taxonomy;
use std::collections::BTreeMap;

/// Category recorded for ids the taxonomy does not know.
pub const UNCLASSIFIED_CATEGORY: &str = "UNCLASSIFIED";

/// One rubro per distinct canonical id, ordered by id.
pub fn plan_rubros(baseline: &Baseline, taxonomy: &Taxonomy) -> Vec<Rubro> {
    let lines = estimate_lines(baseline, taxonomy);
    plan_from_lines(baseline, taxonomy, &lines)
}

fn plan_from_lines(baseline: &Baseline, taxonomy: &Taxonomy, lines: &[EstimateLine]) -> Vec<Rubro> {
    let mut by_id: BTreeMap<&str, &EstimateLine> = BTreeMap::new();
    for line in lines {
        by_id
            .entry(line.resolution.canonical_id.as_str())
            .or_insert(line);
    }

    by_id
        .into_iter()
        .map(|(canonical_id, line)| {
            let (description, category, found) = match taxonomy.entry(canonical_id) {
                Some(entry) if line.resolution.found => {
                    (entry.description.clone(), entry.category.clone(), true)
                }
                _ => {
                    let description = line
                        .description
                        .clone()
                        .unwrap_or_else(|| line.raw_id.clone());
                    (description, UNCLASSIFIED_CATEGORY.to_string(), false)
                }
            };
            Rubro {
                project_id: baseline.project_id.clone(),
                baseline_id: baseline.baseline_id.clone(),
                canonical_rubro_id: canonical_id.to_string(),
                description,
                category,
                taxonomy_found: found,
                source: SOURCE_MATERIALIZER.to_string(),
            }
        })
        .collect()
}

impl<S: PlanStore + ?Sized> Materializer<'_, S> {
    /// Write the baseline's rubro catalog if absent.
    pub fn materialize_rubros(
        &self,
        baseline: &Baseline,
        options: MaterializeOptions,
    ) -> Result<MaterializeSummary> {
        if !self.precheck(baseline, "rubros")? {
            return Ok(MaterializeSummary::no_estimates());
        }

        let lines = estimate_lines(baseline, self.taxonomy);
        let rows = plan_from_lines(baseline, self.taxonomy, &lines);

        self.persist(
            baseline,
            "rubros",
            &rows,
            unresolved_ids(&lines),
            keys::rubro_prefix(&baseline.baseline_id),
            options,
            ItemKey::for_rubro,
            |chunk| self.store.put_rubros_if_absent(chunk),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::test_support::{baseline, labor, non_labor};
    use crate::store::SqliteStore;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_one_rubro_per_canonical_id() {
        let tax = Taxonomy::embedded().expect("taxonomy");
        let mut b = baseline(12);
        b.labor_estimates.push(labor("MOD-ING", 1.0, 10.0));
        b.labor_estimates.push(labor("Ingeniero Soporte N1", 1.0, 10.0));
        b.non_labor_estimates.push(non_labor("RB0030", 10.0, None));

        let rubros = plan_rubros(&b, &tax);
        let ids: Vec<_> = rubros.iter().map(|r| r.canonical_rubro_id.as_str()).collect();
        assert_eq!(ids, vec!["MOD-ING", "TEC-LIC-MON"]);
        assert_eq!(rubros[0].category, "MOD");
        assert_eq!(rubros[1].description, "Licencias de monitoreo");
        assert!(rubros.iter().all(|r| r.taxonomy_found));
    }

    #[test]
    fn test_unknown_id_materialized_with_fallback() {
        let tax = Taxonomy::embedded().expect("taxonomy");
        let store = SqliteStore::open_in_memory().expect("store");
        let mut b = baseline(12);
        let mut item = non_labor("Cafetería", 10.0, None);
        item.description = Some("Café para la mesa de ayuda".to_string());
        b.non_labor_estimates.push(item);

        let materializer = Materializer::new(&store, &tax);
        let first = materializer
            .materialize_rubros(&b, MaterializeOptions::default())
            .expect("first");
        assert_eq!((first.attempted, first.written, first.skipped), (1, 1, 0));
        assert_eq!(first.unresolved_ids, vec!["Cafetería".to_string()]);

        let second = materializer
            .materialize_rubros(&b, MaterializeOptions::default())
            .expect("second");
        assert_eq!((second.attempted, second.written, second.skipped), (1, 0, 1));

        let stored = store.rubros("P-001", "BL-001").expect("read");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].canonical_rubro_id, "Cafetería");
        assert_eq!(stored[0].description, "Café para la mesa de ayuda");
        assert_eq!(stored[0].category, UNCLASSIFIED_CATEGORY);
        assert!(!stored[0].taxonomy_found);
    }

    #[test]
    fn test_empty_baseline_is_a_no_op() {
        let tax = Taxonomy::embedded().expect("taxonomy");
        let store = SqliteStore::open_in_memory().expect("store");
        let summary = Materializer::new(&store, &tax)
            .materialize_rubros(&baseline(12), MaterializeOptions::default())
            .expect("no-op");
        assert_eq!(summary, MaterializeSummary::no_estimates());
        assert!(!summary.is_write_path_fault());
    }
}
