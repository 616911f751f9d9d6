//! `finz import-actuals` and `finz import-overrides`

use crate::{EXIT_OK, EXIT_WARNINGS, print_json, read_input};
use anyhow::Context;
use clap::Parser;
use finz_engine::ingest::{actuals_from_json, overrides_from_json};
use finz_engine::{FinzEngine, IngestSummary, PlanStore};
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// JSON array of records
    #[arg(value_name = "JSON")]
    pub input: PathBuf,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

pub fn run_import_actuals<S: PlanStore>(
    engine: &FinzEngine<S>,
    args: &ImportArgs,
) -> anyhow::Result<i32> {
    let contents = read_input(&args.input)?;
    let records = actuals_from_json(&contents)
        .with_context(|| format!("in {}", args.input.display()))?;
    let summary = engine.import_actuals(&records)?;
    report("actuals", &summary, args.json)
}

pub fn run_import_overrides<S: PlanStore>(
    engine: &FinzEngine<S>,
    args: &ImportArgs,
) -> anyhow::Result<i32> {
    let contents = read_input(&args.input)?;
    let records = overrides_from_json(&contents)
        .with_context(|| format!("in {}", args.input.display()))?;
    let summary = engine.import_overrides(&records)?;
    report("overrides", &summary, args.json)
}

fn report(what: &str, summary: &IngestSummary, json: bool) -> anyhow::Result<i32> {
    if json {
        print_json(summary)?;
    } else {
        println!(
            "Imported {what}: {} accepted, {} duplicates, {} rejected",
            summary.accepted,
            summary.duplicates,
            summary.rejected.len()
        );
        for rejected in &summary.rejected {
            println!("  record {}: {}", rejected.position, rejected.reason);
        }
    }
    Ok(if summary.rejected.is_empty() {
        EXIT_OK
    } else {
        EXIT_WARNINGS
    })
}
