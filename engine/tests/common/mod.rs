#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]
//! Shared fixtures and store doubles for the integration tests.

use chrono::NaiveDate;
use finz_engine::baseline::{CostNature, LaborEstimate, NonLaborEstimate};
use finz_engine::store::{BatchWrite, FailedWrite, ItemKey, PlanStore};
use finz_engine::{
    ActualSpend, Allocation, Baseline, ForecastOverride, Result, Rubro, SqliteStore,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn baseline(duration_months: u32) -> Baseline {
    Baseline {
        baseline_id: "BL-2024-007".to_string(),
        project_id: "P-ACME-01".to_string(),
        client_name: "ACME Telecom".to_string(),
        currency: "USD".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
        duration_months,
        signature_hash: "sha256:5f2c".to_string(),
        created_by: "pmo@example.com".to_string(),
        assumptions: vec!["Tarifas fijas por 12 meses".to_string()],
        labor_estimates: vec![],
        non_labor_estimates: vec![],
        fx_indexation: None,
    }
}

pub fn labor(role: &str, fte_count: f64, monthly_rate: f64) -> LaborEstimate {
    LaborEstimate {
        role: role.to_string(),
        rubro_id: None,
        fte_count,
        monthly_rate,
        start_month: None,
        end_month: None,
    }
}

pub fn non_labor(category: &str, amount: f64, start: u32, end: u32) -> NonLaborEstimate {
    NonLaborEstimate {
        category: category.to_string(),
        rubro_id: None,
        description: None,
        amount,
        capex_or_opex: CostNature::Opex,
        one_time: false,
        start_month: Some(start),
        end_month: Some(end),
    }
}

/// 36 months, three labor roles on distinct rubros: 108 allocations.
pub fn three_role_baseline() -> Baseline {
    let mut b = baseline(36);
    b.labor_estimates = vec![
        labor("Ingeniero Soporte N1", 3.0, 3_200.0),
        labor("MOD-LEAD", 1.0, 5_400.0),
        labor("Service Delivery Manager", 0.5, 8_000.0),
    ];
    b
}

/// Delegates to an in-memory store and counts every call.
pub struct CountingStore {
    inner: SqliteStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> &SqliteStore {
        self.calls.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

impl PlanStore for CountingStore {
    fn put_baseline_if_absent(&self, baseline: &Baseline) -> Result<bool> {
        self.tick().put_baseline_if_absent(baseline)
    }
    fn baseline(&self, project_id: &str, baseline_id: &str) -> Result<Option<Baseline>> {
        self.tick().baseline(project_id, baseline_id)
    }
    fn latest_baseline(&self, project_id: &str) -> Result<Option<Baseline>> {
        self.tick().latest_baseline(project_id)
    }
    fn put_allocations_if_absent(&self, rows: &[Allocation]) -> Result<BatchWrite> {
        self.tick().put_allocations_if_absent(rows)
    }
    fn put_rubros_if_absent(&self, rows: &[Rubro]) -> Result<BatchWrite> {
        self.tick().put_rubros_if_absent(rows)
    }
    fn existing_item_keys(&self, owner: &str, prefix: &str) -> Result<BTreeSet<String>> {
        self.tick().existing_item_keys(owner, prefix)
    }
    fn allocations(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Allocation>> {
        self.tick().allocations(project_id, baseline_id)
    }
    fn rubros(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Rubro>> {
        self.tick().rubros(project_id, baseline_id)
    }
    fn put_forecast_override(&self, row: &ForecastOverride) -> Result<()> {
        self.tick().put_forecast_override(row)
    }
    fn forecast_overrides(&self, project_id: &str) -> Result<Vec<ForecastOverride>> {
        self.tick().forecast_overrides(project_id)
    }
    fn put_actual_if_absent(&self, row: &ActualSpend) -> Result<bool> {
        self.tick().put_actual_if_absent(row)
    }
    fn actuals(&self, project_id: &str) -> Result<Vec<ActualSpend>> {
        self.tick().actuals(project_id)
    }
}

/// Decides whether an allocation write fails, given how many times that
/// key has been attempted before.
pub type FaultRule = Box<dyn Fn(&Allocation, u32) -> bool + Send + Sync>;

/// Injects per-row allocation failures in front of an in-memory store.
pub struct FaultyStore {
    inner: SqliteStore,
    rule: FaultRule,
    attempts: Mutex<HashMap<ItemKey, u32>>,
    batches: AtomicUsize,
}

impl FaultyStore {
    pub fn new(rule: FaultRule) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            rule,
            attempts: Mutex::new(HashMap::new()),
            batches: AtomicUsize::new(0),
        }
    }

    /// Rows matching `pred` fail on their first attempt only.
    pub fn fail_once(pred: impl Fn(&Allocation) -> bool + Send + Sync + 'static) -> Self {
        Self::new(Box::new(move |row, attempt| attempt == 0 && pred(row)))
    }

    /// Rows matching `pred` always fail.
    pub fn fail_always(pred: impl Fn(&Allocation) -> bool + Send + Sync + 'static) -> Self {
        Self::new(Box::new(move |row, _| pred(row)))
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, key: &ItemKey) -> u32 {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

impl PlanStore for FaultyStore {
    fn put_baseline_if_absent(&self, baseline: &Baseline) -> Result<bool> {
        self.inner.put_baseline_if_absent(baseline)
    }
    fn baseline(&self, project_id: &str, baseline_id: &str) -> Result<Option<Baseline>> {
        self.inner.baseline(project_id, baseline_id)
    }
    fn latest_baseline(&self, project_id: &str) -> Result<Option<Baseline>> {
        self.inner.latest_baseline(project_id)
    }
    fn put_allocations_if_absent(&self, rows: &[Allocation]) -> Result<BatchWrite> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut failed = Vec::new();
        let mut passing = Vec::new();
        {
            let mut attempts = self.attempts.lock().unwrap();
            for row in rows {
                let key = ItemKey::for_allocation(row);
                let seen = attempts.entry(key.clone()).or_insert(0);
                let fail = (self.rule)(row, *seen);
                *seen += 1;
                if fail {
                    failed.push(FailedWrite {
                        key,
                        reason: "injected throttling".to_string(),
                    });
                } else {
                    passing.push(row.clone());
                }
            }
        }
        let mut outcome = self.inner.put_allocations_if_absent(&passing)?;
        outcome.failed.extend(failed);
        Ok(outcome)
    }
    fn put_rubros_if_absent(&self, rows: &[Rubro]) -> Result<BatchWrite> {
        self.inner.put_rubros_if_absent(rows)
    }
    fn existing_item_keys(&self, owner: &str, prefix: &str) -> Result<BTreeSet<String>> {
        self.inner.existing_item_keys(owner, prefix)
    }
    fn allocations(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Allocation>> {
        self.inner.allocations(project_id, baseline_id)
    }
    fn rubros(&self, project_id: &str, baseline_id: &str) -> Result<Vec<Rubro>> {
        self.inner.rubros(project_id, baseline_id)
    }
    fn put_forecast_override(&self, row: &ForecastOverride) -> Result<()> {
        self.inner.put_forecast_override(row)
    }
    fn forecast_overrides(&self, project_id: &str) -> Result<Vec<ForecastOverride>> {
        self.inner.forecast_overrides(project_id)
    }
    fn put_actual_if_absent(&self, row: &ActualSpend) -> Result<bool> {
        self.inner.put_actual_if_absent(row)
    }
    fn actuals(&self, project_id: &str) -> Result<Vec<ActualSpend>> {
        self.inner.actuals(project_id)
    }
}
