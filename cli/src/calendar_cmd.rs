//! `finz calendar`

use crate::{EXIT_OK, EXIT_WARNINGS};
use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use finz_engine::{FinzError, YearMonth, calendar_month_for, month_index_for};

#[derive(Debug, Parser)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["index", "month"])))]
pub struct CalendarArgs {
    /// Baseline start date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: String,

    /// 1-based month index to convert to a calendar month
    #[arg(long)]
    pub index: Option<u32>,

    /// Calendar month (YYYY-MM) to convert to a month index
    #[arg(long, value_name = "YYYY-MM")]
    pub month: Option<String>,
}

pub fn run_calendar(args: &CalendarArgs) -> anyhow::Result<i32> {
    let start = parse_start(&args.start)?;

    if let Some(index) = args.index {
        println!("{}", calendar_month_for(start, index)?);
        return Ok(EXIT_OK);
    }

    let month: YearMonth = args.month.as_deref().unwrap_or_default().parse()?;
    match month_index_for(start, month) {
        Some(index) => {
            println!("M{index}");
            Ok(EXIT_OK)
        }
        None => {
            println!("{month} is outside the baseline window");
            Ok(EXIT_WARNINGS)
        }
    }
}

fn parse_start(raw: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| FinzError::calendar(format!("invalid start date {trimmed:?}: {e}")))
        .context("--start")
}
