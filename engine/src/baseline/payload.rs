//! Upstream baseline payloads
//!
//! The estimator has written baselines in three shapes over time:
//!
//! ```text
//! V1        { "baseline_id": ..., "labor_estimates": [{ "fte_count": ... }] }
//! V2        { "baselineId": ...,  "laborEstimates": [{ "fteCount": ... }] }
//! Envelope  { "pk": "PROJECT#P-1", "sk": "BASELINE#BL-1", "payload": <V1 | V2> }
//! ```
//!
//! [`BaselinePayload::from_value`] classifies the document once and
//! [`BaselinePayload::into_baseline`] normalizes it into a validated
//! [`Baseline`]. No other code looks at raw baseline JSON.

use super::{Baseline, CostNature, FxIndexation, LaborEstimate, NonLaborEstimate};
use crate::errors::{FinzError, Result, ValidationError, ValidationIssue};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

/// Keys that only appear in camelCase (V2) documents.
const CAMEL_CASE_MARKERS: &[&str] = &[
    "baselineId",
    "projectId",
    "startDate",
    "durationMonths",
    "laborEstimates",
    "nonLaborEstimates",
    "signatureHash",
];

const OWNER_KEY_PREFIX: &str = "PROJECT#";
const BASELINE_KEY_PREFIX: &str = "BASELINE#";

/// A classified upstream baseline document.
#[derive(Debug, Clone)]
pub enum BaselinePayload {
    /// snake_case records written by the estimator API
    V1(BaselineDraft),
    /// camelCase records from the estimator wizard
    V2(BaselineDraftV2),
    /// A store item wrapping one of the other shapes under `payload`
    Envelope {
        owner_key: Option<String>,
        item_key: Option<String>,
        inner: Box<BaselinePayload>,
    },
}

/// snake_case draft; every field optional until normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineDraft {
    pub baseline_id: Option<String>,
    pub project_id: Option<String>,
    pub client_name: Option<String>,
    pub currency: Option<String>,
    pub start_date: Option<String>,
    pub duration_months: Option<i64>,
    #[serde(alias = "signature")]
    pub signature_hash: Option<String>,
    #[serde(alias = "signed_by")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub labor_estimates: Vec<LaborDraft>,
    #[serde(default)]
    pub non_labor_estimates: Vec<NonLaborDraft>,
    pub fx_indexation: Option<FxIndexation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaborDraft {
    pub role: Option<String>,
    pub rubro_id: Option<String>,
    pub fte_count: Option<f64>,
    pub monthly_rate: Option<f64>,
    pub start_month: Option<i64>,
    pub end_month: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NonLaborDraft {
    pub category: Option<String>,
    pub rubro_id: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub capex_or_opex: Option<CostNature>,
    #[serde(default)]
    pub one_time: bool,
    pub start_month: Option<i64>,
    pub end_month: Option<i64>,
}

/// camelCase draft as sent by the wizard.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineDraftV2 {
    pub baseline_id: Option<String>,
    pub project_id: Option<String>,
    pub client_name: Option<String>,
    pub currency: Option<String>,
    pub start_date: Option<String>,
    pub duration_months: Option<i64>,
    #[serde(alias = "signature")]
    pub signature_hash: Option<String>,
    #[serde(alias = "signedBy")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub labor_estimates: Vec<LaborDraftV2>,
    #[serde(default)]
    pub non_labor_estimates: Vec<NonLaborDraftV2>,
    pub fx_indexation: Option<FxIndexationV2>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaborDraftV2 {
    pub role: Option<String>,
    pub rubro_id: Option<String>,
    pub fte_count: Option<f64>,
    pub monthly_rate: Option<f64>,
    pub start_month: Option<i64>,
    pub end_month: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonLaborDraftV2 {
    pub category: Option<String>,
    pub rubro_id: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub capex_or_opex: Option<CostNature>,
    #[serde(default)]
    pub one_time: bool,
    pub start_month: Option<i64>,
    pub end_month: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxIndexationV2 {
    pub fx_rate: Option<f64>,
    pub indexation_pct_annual: Option<f64>,
    #[serde(default)]
    pub applies_to: super::IndexationScope,
}

impl From<BaselineDraftV2> for BaselineDraft {
    fn from(v2: BaselineDraftV2) -> Self {
        Self {
            baseline_id: v2.baseline_id,
            project_id: v2.project_id,
            client_name: v2.client_name,
            currency: v2.currency,
            start_date: v2.start_date,
            duration_months: v2.duration_months,
            signature_hash: v2.signature_hash,
            created_by: v2.created_by,
            assumptions: v2.assumptions,
            labor_estimates: v2
                .labor_estimates
                .into_iter()
                .map(|item| LaborDraft {
                    role: item.role,
                    rubro_id: item.rubro_id,
                    fte_count: item.fte_count,
                    monthly_rate: item.monthly_rate,
                    start_month: item.start_month,
                    end_month: item.end_month,
                })
                .collect(),
            non_labor_estimates: v2
                .non_labor_estimates
                .into_iter()
                .map(|item| NonLaborDraft {
                    category: item.category,
                    rubro_id: item.rubro_id,
                    description: item.description,
                    amount: item.amount,
                    capex_or_opex: item.capex_or_opex,
                    one_time: item.one_time,
                    start_month: item.start_month,
                    end_month: item.end_month,
                })
                .collect(),
            fx_indexation: v2.fx_indexation.map(|fx| FxIndexation {
                fx_rate: fx.fx_rate,
                indexation_pct_annual: fx.indexation_pct_annual,
                applies_to: fx.applies_to,
            }),
        }
    }
}

impl BaselinePayload {
    /// Parse and classify a JSON document.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| FinzError::ingest_with_source("baseline is not valid JSON", e))?;
        Self::from_value(value)
    }

    /// Classify an already-parsed JSON document.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(FinzError::ingest("baseline payload must be a JSON object"));
        };

        if matches!(map.get("payload"), Some(Value::Object(_))) {
            let owner_key = string_field(&map, &["pk", "owner_key", "ownerKey"]);
            let item_key = string_field(&map, &["sk", "item_key", "itemKey"]);
            let inner = map.remove("payload").unwrap_or(Value::Null);
            let inner = Self::from_value(inner)?;
            if matches!(inner, Self::Envelope { .. }) {
                return Err(FinzError::ingest("nested baseline envelopes are not supported"));
            }
            return Ok(Self::Envelope {
                owner_key,
                item_key,
                inner: Box::new(inner),
            });
        }

        let is_camel = CAMEL_CASE_MARKERS.iter().any(|key| map.contains_key(*key));
        let value = Value::Object(map);
        if is_camel {
            serde_json::from_value(value)
                .map(Self::V2)
                .map_err(|e| FinzError::ingest_with_source("malformed camelCase baseline", e))
        } else {
            serde_json::from_value(value)
                .map(Self::V1)
                .map_err(|e| FinzError::ingest_with_source("malformed baseline", e))
        }
    }

    /// Short name of the detected shape, for logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::V1(_) => "v1",
            Self::V2(_) => "v2",
            Self::Envelope { .. } => "envelope",
        }
    }

    /// Normalize into a validated [`Baseline`].
    pub fn into_baseline(self) -> Result<Baseline> {
        let shape = self.shape();
        let draft = self.into_draft();
        let baseline = draft.into_baseline()?;
        tracing::debug!(
            shape,
            project_id = %baseline.project_id,
            baseline_id = %baseline.baseline_id,
            "normalized baseline payload"
        );
        Ok(baseline)
    }

    fn into_draft(self) -> BaselineDraft {
        match self {
            Self::V1(draft) => draft,
            Self::V2(draft) => draft.into(),
            Self::Envelope {
                owner_key,
                item_key,
                inner,
            } => {
                let mut draft = inner.into_draft();
                if blank(&draft.project_id) {
                    draft.project_id = owner_key
                        .as_deref()
                        .and_then(|k| k.strip_prefix(OWNER_KEY_PREFIX))
                        .map(str::to_string);
                }
                if blank(&draft.baseline_id) {
                    draft.baseline_id = item_key
                        .as_deref()
                        .and_then(|k| k.strip_prefix(BASELINE_KEY_PREFIX))
                        .map(str::to_string);
                }
                draft
            }
        }
    }
}

impl BaselineDraft {
    /// Check presence and types of required fields, then run the full
    /// structural validation on the resulting baseline.
    pub fn into_baseline(self) -> Result<Baseline> {
        let mut issues = Vec::new();

        let baseline_id = required(&mut issues, "baseline_id", self.baseline_id);
        let project_id = required(&mut issues, "project_id", self.project_id);
        let currency = required(&mut issues, "currency", self.currency);
        let signature_hash = required(&mut issues, "signature_hash", self.signature_hash);

        let start_date = match self.start_date.as_deref().map(str::trim) {
            None | Some("") => {
                issues.push(ValidationIssue::new("start_date", "is required"));
                None
            }
            Some(raw) => match parse_start_date(raw) {
                Some(date) => Some(date),
                None => {
                    issues.push(ValidationIssue::new(
                        "start_date",
                        format!("expected YYYY-MM-DD, got {raw:?}"),
                    ));
                    None
                }
            },
        };

        let duration_months = match self.duration_months {
            None => {
                issues.push(ValidationIssue::new("duration_months", "is required"));
                0
            }
            Some(months) => non_negative(&mut issues, "duration_months", months),
        };

        let labor_estimates = self
            .labor_estimates
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let path = format!("labor_estimates[{idx}]");
                LaborEstimate {
                    role: item.role.unwrap_or_default(),
                    rubro_id: item.rubro_id,
                    fte_count: required_number(&mut issues, &path, "fte_count", item.fte_count),
                    monthly_rate: required_number(
                        &mut issues,
                        &path,
                        "monthly_rate",
                        item.monthly_rate,
                    ),
                    start_month: optional_month(&mut issues, &path, "start_month", item.start_month),
                    end_month: optional_month(&mut issues, &path, "end_month", item.end_month),
                }
            })
            .collect();

        let non_labor_estimates = self
            .non_labor_estimates
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let path = format!("non_labor_estimates[{idx}]");
                NonLaborEstimate {
                    category: item.category.unwrap_or_default(),
                    rubro_id: item.rubro_id,
                    description: item.description,
                    amount: required_number(&mut issues, &path, "amount", item.amount),
                    capex_or_opex: item.capex_or_opex.unwrap_or_default(),
                    one_time: item.one_time,
                    start_month: optional_month(&mut issues, &path, "start_month", item.start_month),
                    end_month: optional_month(&mut issues, &path, "end_month", item.end_month),
                }
            })
            .collect();

        let (Some(start_date), true) = (start_date, issues.is_empty()) else {
            return Err(ValidationError {
                project_id,
                baseline_id,
                issues,
            }
            .into());
        };

        let baseline = Baseline {
            baseline_id,
            project_id,
            client_name: self.client_name.unwrap_or_default(),
            currency,
            start_date,
            duration_months,
            signature_hash,
            created_by: self.created_by.unwrap_or_default(),
            assumptions: self.assumptions,
            labor_estimates,
            non_labor_estimates,
            fx_indexation: self.fx_indexation,
        };
        baseline.validate()?;
        Ok(baseline)
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn string_field(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn required(issues: &mut Vec<ValidationIssue>, field: &str, value: Option<String>) -> String {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => v,
        _ => {
            issues.push(ValidationIssue::new(field, "is required"));
            String::new()
        }
    }
}

fn required_number(
    issues: &mut Vec<ValidationIssue>,
    path: &str,
    field: &str,
    value: Option<f64>,
) -> f64 {
    value.unwrap_or_else(|| {
        issues.push(ValidationIssue::new(format!("{path}.{field}"), "is required"));
        0.0
    })
}

fn non_negative(issues: &mut Vec<ValidationIssue>, field: &str, value: i64) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| {
        issues.push(ValidationIssue::new(
            field,
            format!("must be a positive whole number, got {value}"),
        ));
        0
    })
}

fn optional_month(
    issues: &mut Vec<ValidationIssue>,
    path: &str,
    field: &str,
    value: Option<i64>,
) -> Option<u32> {
    value.map(|v| non_negative(issues, &format!("{path}.{field}"), v))
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (date part used).
fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
