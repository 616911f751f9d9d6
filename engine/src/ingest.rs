//! Import of actual spend and forecast overrides
//!
//! Collaborators (payroll, invoicing, the forecast editor) send loosely
//! shaped JSON in either snake_case or camelCase. Records are checked for
//! shape, amount and period here and stored with their raw rubro id; the
//! forecast read canonicalizes them.

use crate::calendar::{YearMonth, check_month_index};
use crate::errors::{FinzError, Result};
use crate::ids::RawRubroId;
use crate::records::{ActualSpend, ForecastOverride, Period, SpendSource};
use crate::store::PlanStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Recorded as `updated_by` when an override does not name its author.
pub const DEFAULT_OVERRIDE_AUTHOR: &str = "import";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualSpendInput {
    #[serde(alias = "projectId")]
    pub project_id: String,
    #[serde(default, alias = "rubroId")]
    pub rubro_id: Option<String>,
    #[serde(default, alias = "lineItemId")]
    pub line_item_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "monthIndex")]
    pub month_index: Option<i64>,
    #[serde(default, alias = "calendarMonth", alias = "month")]
    pub calendar_month: Option<String>,
    pub amount: f64,
    /// `payroll` or `invoice`; invoice when absent
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "externalRef", alias = "invoice_id", alias = "invoiceId")]
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOverrideInput {
    #[serde(alias = "projectId")]
    pub project_id: String,
    #[serde(default, alias = "rubroId")]
    pub rubro_id: Option<String>,
    #[serde(default, alias = "lineItemId")]
    pub line_item_id: Option<String>,
    #[serde(alias = "monthIndex")]
    pub month_index: i64,
    pub amount: f64,
    #[serde(default, alias = "updatedBy")]
    pub updated_by: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A record that was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Zero-based position in the input
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    /// Actual lines already recorded under the same reference
    pub duplicates: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Parse a JSON array of actual spend records.
pub fn actuals_from_json(contents: &str) -> Result<Vec<ActualSpendInput>> {
    serde_json::from_str(contents)
        .map_err(|e| FinzError::ingest_with_source("malformed actuals document", e))
}

/// Parse a JSON array of forecast override records.
pub fn overrides_from_json(contents: &str) -> Result<Vec<ForecastOverrideInput>> {
    serde_json::from_str(contents)
        .map_err(|e| FinzError::ingest_with_source("malformed overrides document", e))
}

impl ActualSpendInput {
    /// Normalize into a storable record, or explain why not.
    pub fn to_record(&self) -> std::result::Result<ActualSpend, String> {
        let project_id = self.project_id.trim();
        if project_id.is_empty() {
            return Err("project_id is required".to_string());
        }
        let rubro_id = self
            .raw_rubro_id()
            .ok_or("one of rubro_id, line_item_id or category is required")?
            .to_string();
        if !self.amount.is_finite() {
            return Err(format!("amount must be a finite number, got {}", self.amount));
        }

        let period = match (self.month_index, self.calendar_month.as_deref()) {
            (Some(idx), _) => {
                let idx = u32::try_from(idx).map_err(|_| format!("invalid month index {idx}"))?;
                check_month_index(idx).map_err(|e| e.to_string())?;
                Period::Index(idx)
            }
            (None, Some(month)) => {
                Period::Calendar(month.parse::<YearMonth>().map_err(|e| e.to_string())?)
            }
            (None, None) => return Err("month_index or calendar_month is required".to_string()),
        };

        let source = match self.source.as_deref() {
            None => SpendSource::Invoice,
            Some(raw) => {
                SpendSource::parse(raw).ok_or_else(|| format!("unknown spend source {raw:?}"))?
            }
        };

        let external_ref = match self.external_ref.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => reference.to_string(),
            _ => derived_external_ref(project_id, &rubro_id, &period, self.amount, source),
        };

        Ok(ActualSpend {
            project_id: project_id.to_string(),
            rubro_id,
            period,
            amount: self.amount,
            source,
            external_ref,
        })
    }
}

impl ForecastOverrideInput {
    pub fn to_record(&self) -> std::result::Result<ForecastOverride, String> {
        let project_id = self.project_id.trim();
        if project_id.is_empty() {
            return Err("project_id is required".to_string());
        }
        let rubro_id = self
            .raw_rubro_id()
            .ok_or("rubro_id or line_item_id is required")?
            .to_string();
        let month_index = u32::try_from(self.month_index)
            .map_err(|_| format!("invalid month index {}", self.month_index))?;
        check_month_index(month_index).map_err(|e| e.to_string())?;
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            ));
        }

        Ok(ForecastOverride {
            project_id: project_id.to_string(),
            rubro_id,
            month_index,
            amount: self.amount,
            updated_by: self
                .updated_by
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_OVERRIDE_AUTHOR)
                .to_string(),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Stable reference for records that arrive without one, so re-importing
/// the same file is idempotent.
fn derived_external_ref(
    project_id: &str,
    rubro_id: &str,
    period: &Period,
    amount: f64,
    source: SpendSource,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(rubro_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(period.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(format!("{amount:.2}").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(source.as_str().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Record actuals, skipping lines already recorded under the same reference.
pub fn ingest_actuals<S: PlanStore + ?Sized>(
    store: &S,
    inputs: &[ActualSpendInput],
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    for (position, input) in inputs.iter().enumerate() {
        let record = match input.to_record() {
            Ok(record) => record,
            Err(reason) => {
                tracing::warn!(position, project_id = %input.project_id, %reason, "actual rejected");
                summary.rejected.push(RejectedRecord { position, reason });
                continue;
            }
        };
        if store.put_actual_if_absent(&record)? {
            summary.accepted += 1;
        } else {
            summary.duplicates += 1;
        }
    }
    tracing::info!(
        accepted = summary.accepted,
        duplicates = summary.duplicates,
        rejected = summary.rejected.len(),
        "actuals imported"
    );
    Ok(summary)
}

/// Record overrides; a later override for the same month replaces the earlier.
pub fn ingest_overrides<S: PlanStore + ?Sized>(
    store: &S,
    inputs: &[ForecastOverrideInput],
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    for (position, input) in inputs.iter().enumerate() {
        match input.to_record() {
            Ok(record) => {
                store.put_forecast_override(&record)?;
                summary.accepted += 1;
            }
            Err(reason) => {
                tracing::warn!(position, project_id = %input.project_id, %reason, "override rejected");
                summary.rejected.push(RejectedRecord { position, reason });
            }
        }
    }
    tracing::info!(
        accepted = summary.accepted,
        rejected = summary.rejected.len(),
        "forecast overrides imported"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use serde_json::json;

    fn actual(value: serde_json::Value) -> ActualSpendInput {
        serde_json::from_value(value).expect("actual input")
    }

    #[test]
    fn test_actual_shapes() {
        let snake = actual(json!({
            "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": 3,
            "amount": 80.0, "source": "payroll", "external_ref": "NOM-1"
        }))
        .to_record()
        .expect("record");
        assert_eq!(snake.period, Period::Index(3));
        assert_eq!(snake.source, SpendSource::Payroll);
        assert_eq!(snake.external_ref, "NOM-1");

        let camel = actual(json!({
            "projectId": "P-1", "lineItemId": "RB0001", "calendarMonth": "2025-01",
            "amount": 12.5, "invoiceId": "F-77"
        }))
        .to_record()
        .expect("record");
        assert_eq!(camel.rubro_id, "RB0001");
        assert_eq!(camel.source, SpendSource::Invoice);
        assert_eq!(camel.period, Period::Calendar("2025-01".parse().expect("month")));
        assert_eq!(camel.external_ref, "F-77");
    }

    #[test]
    fn test_actual_rejections() {
        let cases = [
            json!({ "project_id": " ", "rubro_id": "MOD-ING", "month_index": 1, "amount": 1.0 }),
            json!({ "project_id": "P-1", "month_index": 1, "amount": 1.0 }),
            json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "amount": 1.0 }),
            json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": 61, "amount": 1.0 }),
            json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": -1, "amount": 1.0 }),
            json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month": "2025/01", "amount": 1.0 }),
            json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": 1, "amount": 1.0, "source": "gift" }),
        ];
        for case in cases {
            assert!(actual(case.clone()).to_record().is_err(), "accepted {case}");
        }
    }

    #[test]
    fn test_derived_external_ref_is_stable() {
        let input = actual(json!({
            "project_id": "P-1", "category": "Licencias", "month_index": 2, "amount": 40.0
        }));
        let a = input.to_record().expect("record");
        let b = input.to_record().expect("record");
        assert_eq!(a.external_ref, b.external_ref);
        assert!(a.external_ref.starts_with("sha256:"));
        assert_eq!(a.external_ref.len(), "sha256:".len() + 64);

        let mut other = input.clone();
        other.amount = 41.0;
        assert_ne!(other.to_record().expect("record").external_ref, a.external_ref);
    }

    #[test]
    fn test_ingest_actuals_is_idempotent() {
        let store = SqliteStore::open_in_memory().expect("store");
        let inputs = vec![
            actual(json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": 1, "amount": 50.0 })),
            actual(json!({ "project_id": "P-1", "rubro_id": "MOD-ING", "month_index": 1, "amount": 30.0 })),
            actual(json!({ "project_id": "P-1", "month_index": 1, "amount": 30.0 })),
        ];

        let first = ingest_actuals(&store, &inputs).expect("first");
        assert_eq!(first.accepted, 2);
        assert_eq!(first.duplicates, 0);
        assert_eq!(first.rejected.len(), 1);
        assert_eq!(first.rejected[0].position, 2);

        let second = ingest_actuals(&store, &inputs).expect("second");
        assert_eq!((second.accepted, second.duplicates), (0, 2));
        assert_eq!(store.actuals("P-1").expect("read").len(), 2);
    }

    #[test]
    fn test_invoice_lines_sharing_an_invoice_id_are_all_kept() {
        let store = SqliteStore::open_in_memory().expect("store");
        let inputs = actuals_from_json(
            r#"[
                { "projectId": "P-1", "rubroId": "MOD-ING", "monthIndex": 1,
                  "amount": 80.0, "invoiceId": "F-77" },
                { "projectId": "P-1", "rubroId": "TEC-LAB", "monthIndex": 1,
                  "amount": 40.0, "invoiceId": "F-77" },
                { "projectId": "P-1", "rubroId": "TEC-LAB", "monthIndex": 2,
                  "amount": 40.0, "invoiceId": "F-77" }
            ]"#,
        )
        .expect("parse");

        let first = ingest_actuals(&store, &inputs).expect("first");
        assert_eq!((first.accepted, first.duplicates), (3, 0));
        let stored = store.actuals("P-1").expect("read");
        assert_eq!(stored.len(), 3);
        assert_eq!(stored.iter().map(|a| a.amount).sum::<f64>(), 160.0);

        let again = ingest_actuals(&store, &inputs).expect("again");
        assert_eq!((again.accepted, again.duplicates), (0, 3));
    }

    #[test]
    fn test_ingest_overrides_replaces_per_month() {
        let store = SqliteStore::open_in_memory().expect("store");
        let inputs = overrides_from_json(
            r#"[
                { "projectId": "P-1", "lineItemId": "RB0001", "monthIndex": 2, "amount": 120.0 },
                { "project_id": "P-1", "rubro_id": "RB0001", "month_index": 2, "amount": 130.0,
                  "updated_by": "pm@example.com" },
                { "project_id": "P-1", "rubro_id": "RB0001", "month_index": 0, "amount": 1.0 },
                { "project_id": "P-1", "rubro_id": "RB0001", "month_index": 3, "amount": -5.0 }
            ]"#,
        )
        .expect("parse");

        let summary = ingest_overrides(&store, &inputs).expect("ingest");
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rejected.len(), 2);

        let stored = store.forecast_overrides("P-1").expect("read");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].amount, 130.0);
        assert_eq!(stored[0].updated_by, "pm@example.com");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(actuals_from_json("{}").is_err());
        assert!(overrides_from_json("[{\"amount\": 1}]").is_err());
    }
}
