//! Month calendar
//!
//! Maps 1-based baseline month indices onto calendar year-months. Index 1 is
//! the month containing the baseline start date; every later index advances
//! exactly one calendar month. Month arithmetic is done on an absolute month
//! count so year rollover never drifts, however long the baseline.

use crate::errors::{FinzError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest supported baseline, in months (five years).
pub const MAX_MONTH_INDEX: u32 = 60;

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a year-month; `month` is 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(FinzError::calendar(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        if !(0..=9999).contains(&year) {
            return Err(FinzError::calendar(format!(
                "year must have four digits, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The calendar month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Advance by `months` calendar months.
    pub fn plus_months(self, months: u32) -> Self {
        Self::from_ordinal(self.ordinal() + i64::from(months))
    }

    /// Signed number of months from `earlier` to `self`.
    pub fn months_since(self, earlier: YearMonth) -> i64 {
        self.ordinal() - earlier.ordinal()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = FinzError;

    /// Accepts `YYYY-MM`, and also a full `YYYY-MM-DD` date (the day must be valid but is dropped).
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let mut parts = trimmed.splitn(3, '-');
        let (Some(year), Some(month)) = (parts.next(), parts.next()) else {
            return Err(FinzError::calendar(format!(
                "expected YYYY-MM, got {trimmed:?}"
            )));
        };
        if year.len() != 4 || month.len() != 2 {
            return Err(FinzError::calendar(format!(
                "expected YYYY-MM, got {trimmed:?}"
            )));
        }
        if parts.next().is_some() {
            let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| {
                FinzError::calendar(format!("expected YYYY-MM or YYYY-MM-DD, got {trimmed:?}: {e}"))
            })?;
            return Self::new(date.year(), date.month());
        }
        let year: i32 = year
            .parse()
            .map_err(|_| FinzError::calendar(format!("invalid year in {trimmed:?}")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| FinzError::calendar(format!("invalid month in {trimmed:?}")))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = FinzError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Reject month indices outside `1..=MAX_MONTH_INDEX`.
pub fn check_month_index(month_index: u32) -> Result<()> {
    if (1..=MAX_MONTH_INDEX).contains(&month_index) {
        Ok(())
    } else {
        Err(FinzError::calendar(format!(
            "month index must be between 1 and {MAX_MONTH_INDEX}, got {month_index}"
        )))
    }
}

/// Calendar month for a 1-based baseline month index.
pub fn calendar_month_for(start_date: NaiveDate, month_index: u32) -> Result<YearMonth> {
    check_month_index(month_index)?;
    Ok(YearMonth::from_date(start_date).plus_months(month_index - 1))
}

/// Inverse of [`calendar_month_for`]: the month index a calendar month falls
/// on, or `None` when it lies before the start or past the supported range.
pub fn month_index_for(start_date: NaiveDate, month: YearMonth) -> Option<u32> {
    let offset = month.months_since(YearMonth::from_date(start_date));
    if offset < 0 || offset >= i64::from(MAX_MONTH_INDEX) {
        return None;
    }
    Some(offset as u32 + 1)
}
