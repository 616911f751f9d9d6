//! `finz` command line
//!
//! ## Commands
//!
//! - `finz materialize <BASELINE_JSON>` - hand off a signed baseline
//! - `finz forecast --project <ID>` - print the forecast grid
//! - `finz import-actuals <JSON>` / `finz import-overrides <JSON>`
//! - `finz taxonomy check|resolve` - inspect the rubro taxonomy
//! - `finz calendar --start <DATE> --index <N>` - month index arithmetic
//!
//! ## Exit codes
//!
//! - 0: success
//! - 1: completed with warnings (unresolved ids, rejected records)
//! - 2: bad input (malformed baseline, unknown project, blocked handoff)
//! - 3: infrastructure error (config, taxonomy table, store)

pub mod calendar_cmd;
pub mod forecast_cmd;
pub mod import_cmd;
pub mod materialize_cmd;
pub mod taxonomy_cmd;

use clap::{Parser, Subcommand};
use finz_engine::{FinzConfig, FinzEngine, FinzError};
use std::path::PathBuf;

pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNINGS: i32 = 1;
pub const EXIT_INPUT_ERROR: i32 = 2;
pub const EXIT_INFRA_ERROR: i32 = 3;

/// Finanzas baseline materialization and forecast tool
#[derive(Debug, Parser)]
#[command(name = "finz", version, about)]
pub struct FinzCli {
    /// Config file (default: $FINZ_CONFIG, then ~/.config/finz/finz.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Plan store location, overriding the configured db_path
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: FinzSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum FinzSubcommand {
    /// Validate, record and materialize a signed baseline
    Materialize(materialize_cmd::MaterializeArgs),

    /// Planned vs forecast vs actual, per rubro and month
    Forecast(forecast_cmd::ForecastArgs),

    /// Import payroll and invoice actuals from a JSON array
    ImportActuals(import_cmd::ImportArgs),

    /// Import forecast overrides from a JSON array
    ImportOverrides(import_cmd::ImportArgs),

    /// Inspect the rubro taxonomy
    Taxonomy(taxonomy_cmd::TaxonomyCli),

    /// Convert between month indices and calendar months
    Calendar(calendar_cmd::CalendarArgs),
}

impl FinzCli {
    pub fn run(self) -> i32 {
        match self.dispatch() {
            Ok(code) => code,
            Err(err) => {
                let code = exit_code_for(&err);
                tracing::error!(exit_code = code, error = %format!("{err:#}"), "command failed");
                eprintln!("error: {err:#}");
                code
            }
        }
    }

    fn dispatch(self) -> anyhow::Result<i32> {
        let cfg = load_config(self.config.as_deref(), self.db.as_deref())?;
        match self.command {
            FinzSubcommand::Materialize(args) => {
                materialize_cmd::run_materialize(&FinzEngine::with_config(cfg)?, &args)
            }
            FinzSubcommand::Forecast(args) => {
                forecast_cmd::run_forecast(&FinzEngine::with_config(cfg)?, &args)
            }
            FinzSubcommand::ImportActuals(args) => {
                import_cmd::run_import_actuals(&FinzEngine::with_config(cfg)?, &args)
            }
            FinzSubcommand::ImportOverrides(args) => {
                import_cmd::run_import_overrides(&FinzEngine::with_config(cfg)?, &args)
            }
            FinzSubcommand::Taxonomy(cli) => cli.run(&cfg),
            FinzSubcommand::Calendar(args) => calendar_cmd::run_calendar(&args),
        }
    }
}

/// Explicit config file, else the engine's usual lookup; `--db` wins over
/// the file.
pub fn load_config(
    path: Option<&std::path::Path>,
    db: Option<&std::path::Path>,
) -> Result<FinzConfig, FinzError> {
    let mut cfg = match path {
        Some(path) => FinzConfig::load_from_path(path)?,
        None => FinzConfig::load()?,
    };
    if let Some(db) = db {
        cfg.db_path = db.display().to_string();
    }
    Ok(cfg)
}

/// Map a failure onto the documented exit codes.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FinzError>().map(FinzError::category) {
        Some(category) if !category.caller_fixable() => EXIT_INFRA_ERROR,
        _ => EXIT_INPUT_ERROR,
    }
}

/// Pretty JSON for `--json` output.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read a whole input file, naming it in the error.
pub(crate) fn read_input(path: &std::path::Path) -> anyhow::Result<String> {
    use anyhow::Context;
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
