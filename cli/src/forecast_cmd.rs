//! `finz forecast`

use crate::{EXIT_OK, EXIT_WARNINGS, print_json};
use clap::Parser;
use finz_engine::{FinzEngine, ForecastGrid, MonthTotal, PlanStore, summarize_by_month};
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct ForecastArgs {
    /// Project id
    #[arg(long, value_name = "PROJECT_ID")]
    pub project: String,

    /// Baseline id (default: the latest recorded baseline)
    #[arg(long, value_name = "BASELINE_ID")]
    pub baseline: Option<String>,

    /// Months covered by the grid, starting at month 1
    #[arg(long, default_value_t = 12)]
    pub months: u32,

    /// Print per-month totals instead of per-rubro cells
    #[arg(long)]
    pub totals: bool,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TotalsOutput<'a> {
    project_id: &'a str,
    baseline_id: &'a str,
    currency: &'a str,
    totals: &'a [MonthTotal],
}

pub fn run_forecast<S: PlanStore>(
    engine: &FinzEngine<S>,
    args: &ForecastArgs,
) -> anyhow::Result<i32> {
    let grid = engine.forecast_grid(&args.project, args.baseline.as_deref(), args.months)?;

    match (args.totals, args.json) {
        (false, true) => print_json(&grid)?,
        (true, true) => print_json(&TotalsOutput {
            project_id: &grid.project_id,
            baseline_id: &grid.baseline_id,
            currency: &grid.currency,
            totals: &summarize_by_month(&grid.cells),
        })?,
        (false, false) => print_cells(&grid),
        (true, false) => print_totals(&grid),
    }

    Ok(if grid.diagnostics.unresolved_ids.is_empty() {
        EXIT_OK
    } else {
        EXIT_WARNINGS
    })
}

fn print_header(grid: &ForecastGrid) {
    println!(
        "Project {} / baseline {} ({}), months 1-{}",
        grid.project_id, grid.baseline_id, grid.currency, grid.months
    );
    println!();
}

fn print_cells(grid: &ForecastGrid) {
    print_header(grid);
    println!(
        "{:<16} {:>5} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "RUBRO", "MONTH", "PERIOD", "PLANNED", "FORECAST", "ACTUAL", "VARIANCE"
    );
    for cell in &grid.cells {
        let marker = if cell.overridden { "*" } else { "" };
        println!(
            "{:<16} {:>5} {:>8} {:>12.2} {:>11.2}{marker:1} {:>12.2} {:>12.2}",
            cell.rubro_id,
            cell.month_index,
            cell.calendar_month.to_string(),
            cell.planned,
            cell.forecast,
            cell.actual,
            cell.variance
        );
    }
    print_diagnostics(grid);
}

fn print_totals(grid: &ForecastGrid) {
    print_header(grid);
    println!(
        "{:>5} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "MONTH", "PERIOD", "PLANNED", "FORECAST", "ACTUAL", "VARIANCE"
    );
    for total in summarize_by_month(&grid.cells) {
        println!(
            "{:>5} {:>8} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            total.month_index,
            total.calendar_month.to_string(),
            total.planned,
            total.forecast,
            total.actual,
            total.variance
        );
    }
    print_diagnostics(grid);
}

fn print_diagnostics(grid: &ForecastGrid) {
    let diag = &grid.diagnostics;
    if grid.cells.iter().any(|c| c.overridden) {
        println!();
        println!("* forecast overridden");
    }
    if !diag.unresolved_ids.is_empty() {
        println!();
        println!("Unresolved rubro ids: {}", diag.unresolved_ids.join(", "));
    }
    if diag.actuals_out_of_range > 0 || diag.overrides_out_of_range > 0 {
        println!(
            "Outside the grid: {} actuals, {} overrides",
            diag.actuals_out_of_range, diag.overrides_out_of_range
        );
    }
}
