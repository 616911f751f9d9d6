//! Finanzas baseline materialization and forecast engine
//!
//! Turns a signed project baseline (labor and non-labor estimates over up to
//! sixty months) into:
//! - monthly allocations per canonical cost category (rubro)
//! - the project's rubro catalog
//! - a forecast grid that blends planned values with forecast overrides and
//!   actual spend
//!
//! Materialization is idempotent: every row is written only if its natural
//! key is absent, so retries and concurrent runs of the same baseline
//! converge on the same rows. Cost-category ids are canonicalized against an
//! injected [`Taxonomy`] exactly once at each boundary.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod baseline;
pub mod calendar;
pub mod config;
pub mod errors;
pub mod forecast;
pub mod handoff;
pub mod ids;
pub mod ingest;
pub mod materialize;
pub mod records;
pub mod retry;
pub mod store;
pub mod taxonomy;

pub use baseline::{
    Baseline, BaselinePayload, BaselineSource, EstimateCounts, SelectedBaseline, estimate_counts,
    has_estimates, select_baseline,
};
pub use calendar::{MAX_MONTH_INDEX, YearMonth, calendar_month_for, month_index_for};
pub use config::FinzConfig;
pub use errors::{ErrorCategory, FinzError, Result, ValidationError, ValidationIssue};
pub use forecast::{
    ForecastCell, ForecastGrid, ForecastQuery, MonthTotal, compute_forecast_grid,
    summarize_by_month,
};
pub use handoff::HandoffReport;
pub use ingest::{ActualSpendInput, ForecastOverrideInput, IngestSummary};
pub use materialize::{MaterializeOptions, MaterializeStatus, MaterializeSummary, Materializer};
pub use records::{ActualSpend, Allocation, ForecastOverride, Period, Rubro, SpendSource};
pub use store::{PlanStore, SqliteStore};
pub use taxonomy::{Resolution, Taxonomy};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main entry point: configuration, taxonomy and store wired together.
pub struct FinzEngine<S: PlanStore = SqliteStore> {
    cfg: FinzConfig,
    taxonomy: Taxonomy,
    store: S,
}

impl FinzEngine<SqliteStore> {
    /// Load config from the usual locations and open the configured store.
    pub fn new() -> Result<Self> {
        Self::with_config(FinzConfig::load()?)
    }

    pub fn with_config(cfg: FinzConfig) -> Result<Self> {
        let taxonomy = load_taxonomy(&cfg)?;
        let store = SqliteStore::open_with_config(&cfg)?;

        tracing::info!(
            version = VERSION,
            db_path = %cfg.resolved_db_path().display(),
            taxonomy_entries = taxonomy.len(),
            "finz engine initialized"
        );

        Ok(Self {
            cfg,
            taxonomy,
            store,
        })
    }

    /// Default config, embedded taxonomy, private in-memory store.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            cfg: FinzConfig::default(),
            taxonomy: Taxonomy::embedded()?,
            store: SqliteStore::open_in_memory()?,
        })
    }
}

impl<S: PlanStore> FinzEngine<S> {
    pub fn with_store(cfg: FinzConfig, taxonomy: Taxonomy, store: S) -> Self {
        Self {
            cfg,
            taxonomy,
            store,
        }
    }

    pub fn config(&self) -> &FinzConfig {
        &self.cfg
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Materializer using the configured batch size and retry policy.
    pub fn materializer(&self) -> Materializer<'_, S> {
        Materializer::with_config(&self.store, &self.taxonomy, &self.cfg.materialize)
    }

    pub fn materialize_allocations(
        &self,
        baseline: &Baseline,
        options: MaterializeOptions,
    ) -> Result<MaterializeSummary> {
        self.materializer()
            .materialize_allocations(baseline, options)
    }

    pub fn materialize_rubros(
        &self,
        baseline: &Baseline,
        options: MaterializeOptions,
    ) -> Result<MaterializeSummary> {
        self.materializer().materialize_rubros(baseline, options)
    }

    /// Validate, record and materialize a baseline. See [`handoff`].
    pub fn handoff(&self, baseline: &Baseline, options: MaterializeOptions) -> Result<HandoffReport> {
        handoff::run_handoff(&self.store, &self.materializer(), baseline, options)
    }

    /// Forecast grid for `1..=months`, on the given or latest baseline.
    pub fn forecast_grid(
        &self,
        project_id: &str,
        baseline_id: Option<&str>,
        months: u32,
    ) -> Result<ForecastGrid> {
        let query = ForecastQuery {
            project_id: project_id.to_string(),
            baseline_id: baseline_id.map(str::to_string),
            months,
            omit_zero_rows: self.cfg.forecast.omit_zero_rows,
        };
        compute_forecast_grid(&self.store, &self.taxonomy, &query)
    }

    pub fn import_actuals(&self, inputs: &[ActualSpendInput]) -> Result<IngestSummary> {
        ingest::ingest_actuals(&self.store, inputs)
    }

    pub fn import_overrides(&self, inputs: &[ForecastOverrideInput]) -> Result<IngestSummary> {
        ingest::ingest_overrides(&self.store, inputs)
    }

    pub fn canonicalize(&self, raw_id: &str) -> Resolution {
        self.taxonomy.canonicalize(raw_id)
    }
}

/// Configured taxonomy file, or the embedded table.
pub fn load_taxonomy(cfg: &FinzConfig) -> Result<Taxonomy> {
    let taxonomy = match cfg.resolved_taxonomy_path() {
        Some(path) => Taxonomy::load(&path)?,
        None => Taxonomy::embedded()?,
    };
    let broken = taxonomy.check_closure();
    if !broken.is_empty() {
        let names: Vec<_> = broken
            .iter()
            .map(|b| format!("{} -> {}", b.legacy_id, b.target))
            .collect();
        return Err(FinzError::taxonomy(format!(
            "legacy aliases point at missing canonical ids: {}",
            names.join(", ")
        )));
    }
    Ok(taxonomy)
}
