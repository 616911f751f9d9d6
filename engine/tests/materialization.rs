#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Materialization acceptance tests
//!
//! Idempotence, the empty-baseline short-circuit, month windows, and the
//! retry/partial-failure behavior of chunked writes.

mod common;

use common::{CountingStore, FaultyStore, baseline, labor, non_labor, three_role_baseline};
use finz_engine::retry::RetryPolicy;
use finz_engine::store::{ItemKey, PlanStore, keys};
use finz_engine::{
    ErrorCategory, FinzConfig, FinzEngine, MaterializeOptions, MaterializeStatus, Materializer,
    SqliteStore, Taxonomy,
};
use pretty_assertions::assert_eq;

fn taxonomy() -> Taxonomy {
    Taxonomy::embedded().unwrap()
}

fn quick_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

#[test]
fn rerun_of_same_baseline_skips_everything() {
    let store = SqliteStore::open_in_memory().unwrap();
    let tax = taxonomy();
    let materializer = Materializer::new(&store, &tax);
    let b = three_role_baseline();

    let first = materializer
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();
    assert_eq!((first.attempted, first.written, first.skipped), (108, 108, 0));
    assert_eq!(first.status, MaterializeStatus::Completed);
    assert!(first.unresolved_ids.is_empty());

    let second = materializer
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();
    assert_eq!((second.attempted, second.written, second.skipped), (108, 0, 108));
    assert!(!second.is_write_path_fault());

    let rows = store.allocations(&b.project_id, &b.baseline_id).unwrap();
    assert_eq!(rows.len(), 108);
    let rubros: Vec<_> = rows
        .iter()
        .map(|r| r.rubro_id.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(rubros, vec!["MOD-ING", "MOD-LEAD", "MOD-SDM"]);

    let last_ing = rows
        .iter()
        .find(|r| r.rubro_id == "MOD-ING" && r.month_index == 36)
        .unwrap();
    assert_eq!(last_ing.calendar_month.to_string(), "2027-09");
    assert_eq!(last_ing.amount, 9_600.0);
}

#[test]
fn non_labor_window_yields_one_row_per_active_month() {
    let store = SqliteStore::open_in_memory().unwrap();
    let tax = taxonomy();
    let mut b = baseline(12);
    b.non_labor_estimates
        .push(non_labor("licencias monitoreo", 450.0, 4, 6));

    let summary = Materializer::new(&store, &tax)
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();
    assert_eq!(summary.written, 3);

    let months: Vec<_> = store
        .allocations(&b.project_id, &b.baseline_id)
        .unwrap()
        .into_iter()
        .map(|r| (r.rubro_id, r.month_index, r.calendar_month.to_string()))
        .collect();
    assert_eq!(
        months,
        vec![
            ("TEC-LIC-MON".to_string(), 4, "2025-01".to_string()),
            ("TEC-LIC-MON".to_string(), 5, "2025-02".to_string()),
            ("TEC-LIC-MON".to_string(), 6, "2025-03".to_string()),
        ]
    );
}

#[test]
fn empty_baseline_touches_nothing() {
    let store = CountingStore::new();
    let tax = taxonomy();
    let materializer = Materializer::new(&store, &tax);
    let mut b = baseline(24);
    // An empty baseline short-circuits before validation.
    b.signature_hash.clear();

    for options in [
        MaterializeOptions::default(),
        MaterializeOptions { dry_run: true },
    ] {
        let allocations = materializer.materialize_allocations(&b, options).unwrap();
        let rubros = materializer.materialize_rubros(&b, options).unwrap();
        for summary in [allocations, rubros] {
            assert_eq!((summary.attempted, summary.written, summary.skipped), (0, 0, 0));
            assert_eq!(summary.status, MaterializeStatus::NoEstimates);
            assert!(!summary.is_write_path_fault());
        }
    }
    assert_eq!(store.calls(), 0);
}

#[test]
fn batch_size_bounds_each_write() {
    let store = FaultyStore::fail_always(|_| false);
    let tax = taxonomy();
    let summary = Materializer::new(&store, &tax)
        .with_batch_size(25)
        .materialize_allocations(&three_role_baseline(), MaterializeOptions::default())
        .unwrap();
    assert_eq!(summary.written, 108);
    assert_eq!(store.batches(), 5);
}

#[test]
fn failed_subset_is_retried_until_written() {
    let store = FaultyStore::fail_once(|row| row.month_index % 5 == 0);
    let tax = taxonomy();
    let b = three_role_baseline();

    let summary = Materializer::new(&store, &tax)
        .with_retry_policy(quick_retries(3))
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();

    assert_eq!(summary.status, MaterializeStatus::Completed);
    assert_eq!((summary.attempted, summary.written, summary.skipped), (108, 108, 0));
    assert!(summary.errors.is_empty());

    let retried = ItemKey::new(
        keys::project_key(&b.project_id),
        keys::allocation_key(&b.baseline_id, "MOD-ING", 5),
    );
    let untouched = ItemKey::new(
        keys::project_key(&b.project_id),
        keys::allocation_key(&b.baseline_id, "MOD-ING", 4),
    );
    assert_eq!(store.attempts_for(&retried), 2);
    assert_eq!(store.attempts_for(&untouched), 1);
}

#[test]
fn persistent_failures_surface_as_partial() {
    let store = FaultyStore::fail_always(|row| row.rubro_id == "MOD-SDM" && row.month_index <= 2);
    let tax = taxonomy();
    let b = three_role_baseline();

    let summary = Materializer::new(&store, &tax)
        .with_retry_policy(quick_retries(2))
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();

    assert_eq!(summary.status, MaterializeStatus::Partial);
    assert_eq!(summary.written, 106);
    assert!(summary.written < summary.attempted);
    let failed: Vec<_> = summary.errors.iter().map(|f| f.key.item.clone()).collect();
    assert_eq!(
        failed,
        vec![
            "ALLOC#BL-2024-007#MOD-SDM#M1".to_string(),
            "ALLOC#BL-2024-007#MOD-SDM#M2".to_string(),
        ]
    );
    let key = &summary.errors[0].key;
    assert_eq!(store.attempts_for(key), 3);
}

#[test]
fn write_path_fault_blocks_handoff() {
    let store = FaultyStore::fail_always(|_| true);
    let engine = FinzEngine::with_store(FinzConfig::default(), taxonomy(), store);
    let mut b = baseline(6);
    b.labor_estimates.push(labor("MOD-ING", 1.0, 100.0));

    let summary = engine
        .materializer()
        .with_retry_policy(RetryPolicy::none())
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap();
    assert!(summary.is_write_path_fault());

    let err = engine
        .handoff(&b, MaterializeOptions::default())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::HandoffError);
    assert!(err.to_string().contains("BL-2024-007"));
}

#[test]
fn malformed_baseline_fails_before_persistence() {
    let store = CountingStore::new();
    let tax = taxonomy();
    let mut b = three_role_baseline();
    b.labor_estimates[1].end_month = Some(40);
    b.signature_hash = "  ".to_string();

    let err = Materializer::new(&store, &tax)
        .materialize_allocations(&b, MaterializeOptions::default())
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationError);
    let message = err.to_string();
    assert!(message.contains("P-ACME-01"));
    assert!(message.contains("BL-2024-007"));
    assert!(message.contains("labor_estimates[1].end_month"));
    assert!(message.contains("signature_hash"));
    assert_eq!(store.calls(), 0);
}

#[test]
fn payload_shapes_materialize_identically() {
    let snake = r#"{
        "baseline_id": "BL-9", "project_id": "P-9", "currency": "USD",
        "start_date": "2025-02-01", "duration_months": 3, "signature_hash": "sha256:1",
        "labor_estimates": [{ "role": "RB0001", "fte_count": 1, "monthly_rate": 10 }]
    }"#;
    let camel = r#"{
        "pk": "PROJECT#P-9", "sk": "BASELINE#BL-9",
        "payload": {
            "currency": "USD", "startDate": "2025-02-01", "durationMonths": 3,
            "signatureHash": "sha256:1",
            "laborEstimates": [{ "role": "ingeniero soporte", "fteCount": 1, "monthlyRate": 10 }]
        }
    }"#;
    let tax = taxonomy();

    let mut planned = Vec::new();
    for doc in [snake, camel] {
        let b = finz_engine::BaselinePayload::from_json_str(doc)
            .unwrap()
            .into_baseline()
            .unwrap();
        planned.push(finz_engine::materialize::plan_allocations(&b, &tax).unwrap());
    }
    assert_eq!(planned[0], planned[1]);
    assert_eq!(planned[0].len(), 3);
}

#[test]
fn hash_in_ids_does_not_alias_another_baseline() {
    let store = SqliteStore::open_in_memory().unwrap();
    let tax = taxonomy();
    let materializer = Materializer::new(&store, &tax);

    let mut first = baseline(1);
    first.baseline_id = "B#X".to_string();
    first.non_labor_estimates.push(non_labor("Y", 10.0, 1, 1));

    let mut second = baseline(1);
    second.baseline_id = "B".to_string();
    second.non_labor_estimates.push(non_labor("X#Y", 20.0, 1, 1));

    let a = materializer
        .materialize_allocations(&first, MaterializeOptions::default())
        .unwrap();
    assert_eq!((a.written, a.skipped), (1, 0));

    let dry = materializer
        .materialize_allocations(&second, MaterializeOptions { dry_run: true })
        .unwrap();
    assert_eq!((dry.written, dry.skipped), (1, 0));

    let b = materializer
        .materialize_allocations(&second, MaterializeOptions::default())
        .unwrap();
    assert_eq!((b.written, b.skipped), (1, 0));

    let rows = store.allocations(&second.project_id, "B").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].rubro_id, "X#Y");
    assert_eq!(rows[0].amount, 20.0);
    assert_eq!(store.allocations(&first.project_id, "B#X").unwrap().len(), 1);
}
