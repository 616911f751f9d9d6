//! `finz materialize`
//!
//! Reads a baseline document in any supported shape (snake_case,
//! camelCase, or a keyed envelope), optionally alongside the detail copy of
//! the same baseline, and runs the handoff.

use crate::{EXIT_OK, EXIT_WARNINGS, print_json, read_input};
use anyhow::Context;
use clap::Parser;
use finz_engine::{
    Baseline, BaselinePayload, FinzEngine, HandoffReport, MaterializeOptions, MaterializeSummary,
    PlanStore, SelectedBaseline, select_baseline,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
pub struct MaterializeArgs {
    /// Baseline JSON (the summary copy when --detail is also given)
    #[arg(value_name = "BASELINE_JSON")]
    pub baseline: PathBuf,

    /// Detail copy of the same baseline; the copy with estimates wins
    #[arg(long, value_name = "PATH")]
    pub detail: Option<PathBuf>,

    /// Report what would be written without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct MaterializeOutput<'a> {
    source: &'a str,
    tie_broken: bool,
    #[serde(flatten)]
    report: &'a HandoffReport,
}

pub fn read_baseline(path: &Path) -> anyhow::Result<Baseline> {
    let contents = read_input(path)?;
    let payload = BaselinePayload::from_json_str(&contents)
        .with_context(|| format!("in {}", path.display()))?;
    tracing::debug!(path = %path.display(), shape = payload.shape(), "baseline payload read");
    payload
        .into_baseline()
        .with_context(|| format!("in {}", path.display()))
}

pub fn run_materialize<S: PlanStore>(
    engine: &FinzEngine<S>,
    args: &MaterializeArgs,
) -> anyhow::Result<i32> {
    let summary = read_baseline(&args.baseline)?;
    let detail = args.detail.as_deref().map(read_baseline).transpose()?;
    let SelectedBaseline {
        baseline,
        source,
        tie_broken,
        ..
    } = select_baseline(Some(summary), detail)
        .context("no baseline copy to materialize")?;

    let report = engine.handoff(
        &baseline,
        MaterializeOptions {
            dry_run: args.dry_run,
        },
    )?;

    if args.json {
        print_json(&MaterializeOutput {
            source: source.as_str(),
            tie_broken,
            report: &report,
        })?;
    } else {
        print_report(&report, source.as_str(), args.dry_run);
    }

    Ok(if report.is_clean() {
        EXIT_OK
    } else {
        EXIT_WARNINGS
    })
}

fn print_report(report: &HandoffReport, source: &str, dry_run: bool) {
    let mode = if dry_run { " (dry run)" } else { "" };
    println!(
        "Baseline {} for project {} from {source} copy{mode}",
        report.baseline_id, report.project_id
    );
    if !dry_run {
        let recorded = if report.baseline_recorded {
            "recorded"
        } else {
            "already recorded"
        };
        println!("  baseline:    {recorded}");
    }
    print_summary("rubros", &report.rubros);
    print_summary("allocations", &report.allocations);

    let mut unresolved: Vec<&str> = report
        .rubros
        .unresolved_ids
        .iter()
        .chain(&report.allocations.unresolved_ids)
        .map(String::as_str)
        .collect();
    unresolved.sort_unstable();
    unresolved.dedup();
    if !unresolved.is_empty() {
        println!();
        println!("Unresolved rubro ids (kept as written):");
        for id in unresolved {
            println!("  - {id}");
        }
    }
}

fn print_summary(label: &str, summary: &MaterializeSummary) {
    println!(
        "  {label:<12} {}: {} attempted, {} written, {} skipped",
        summary.status.as_str(),
        summary.attempted,
        summary.written,
        summary.skipped
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY_COPY: &str = r#"{
        "baselineId": "BL-7", "projectId": "P-7", "currency": "USD",
        "startDate": "2025-01-15", "durationMonths": 2, "signatureHash": "sha256:7"
    }"#;

    const DETAIL_COPY: &str = r#"{
        "pk": "PROJECT#P-7", "sk": "BASELINE#BL-7",
        "payload": {
            "currency": "USD", "start_date": "2025-01-15", "duration_months": 2,
            "signature_hash": "sha256:7",
            "labor_estimates": [{ "role": "MOD-PM", "fte_count": 1, "monthly_rate": 40 }]
        }
    }"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn test_detail_copy_with_estimates_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = FinzEngine::in_memory().expect("engine");
        let args = MaterializeArgs {
            baseline: write(dir.path(), "summary.json", SUMMARY_COPY),
            detail: Some(write(dir.path(), "detail.json", DETAIL_COPY)),
            dry_run: false,
            json: true,
        };

        assert_eq!(run_materialize(&engine, &args).expect("run"), EXIT_OK);
        let rows = engine.store().allocations("P-7", "BL-7").expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].calendar_month.to_string(), "2025-01");
    }

    #[test]
    fn test_unresolved_ids_exit_with_warnings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = FinzEngine::in_memory().expect("engine");
        let doc = DETAIL_COPY.replace("MOD-PM", "Astronauta");
        let args = MaterializeArgs {
            baseline: write(dir.path(), "b.json", &doc),
            detail: None,
            dry_run: true,
            json: false,
        };

        assert_eq!(run_materialize(&engine, &args).expect("run"), EXIT_WARNINGS);
        assert!(engine.store().allocations("P-7", "BL-7").expect("rows").is_empty());
    }

    #[test]
    fn test_malformed_baseline_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = FinzEngine::in_memory().expect("engine");
        let doc = DETAIL_COPY.replace("\"duration_months\": 2", "\"duration_months\": 61");
        let args = MaterializeArgs {
            baseline: write(dir.path(), "bad.json", &doc),
            detail: None,
            dry_run: false,
            json: false,
        };

        let err = run_materialize(&engine, &args).expect_err("invalid");
        let message = format!("{err:#}");
        assert!(message.contains("bad.json"));
        assert!(message.contains("duration_months"));
        assert_eq!(crate::exit_code_for(&err), crate::EXIT_INPUT_ERROR);
    }
}
