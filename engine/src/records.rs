//! Materialized and ingested records

use crate::calendar::YearMonth;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `source` tag on everything the materializers write.
pub const SOURCE_MATERIALIZER: &str = "baseline_materializer";

/// Round to two decimal places, half away from zero.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Planned cost for one canonical rubro in one project month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub project_id: String,
    pub baseline_id: String,
    pub rubro_id: String,
    pub month_index: u32,
    pub calendar_month: YearMonth,
    pub amount: f64,
    pub source: String,
}

/// Project-scoped catalog entry for a canonical rubro used by a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubro {
    pub project_id: String,
    pub baseline_id: String,
    pub canonical_rubro_id: String,
    pub description: String,
    pub category: String,
    /// `false` when the id did not resolve and the raw id was kept
    pub taxonomy_found: bool,
    pub source: String,
}

/// Forecast value that replaces the planned amount for one month.
///
/// `rubro_id` is stored as received; canonicalization happens on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOverride {
    pub project_id: String,
    pub rubro_id: String,
    pub month_index: u32,
    pub amount: f64,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// When a spend record happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Index(u32),
    Calendar(YearMonth),
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(idx) => write!(f, "M{idx}"),
            Self::Calendar(month) => write!(f, "{month}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendSource {
    Payroll,
    Invoice,
}

impl SpendSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payroll => "payroll",
            Self::Invoice => "invoice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "payroll" | "nomina" | "nómina" => Some(Self::Payroll),
            "invoice" | "factura" => Some(Self::Invoice),
            _ => None,
        }
    }
}

/// One payroll or invoice line. `rubro_id` is stored as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualSpend {
    pub project_id: String,
    pub rubro_id: String,
    pub period: Period,
    pub amount: f64,
    pub source: SpendSource,
    pub external_ref: String,
}
