//! Raw rubro id extraction
//!
//! Each entity that names a cost category carries it in one of several
//! fields depending on where it came from. The precedence for each entity is
//! fixed here, once, so every boundary hands the taxonomy resolver the same
//! raw id for the same record.

use crate::baseline::{LaborEstimate, NonLaborEstimate};
use crate::ingest::{ActualSpendInput, ForecastOverrideInput};

/// The raw (not yet canonicalized) cost-category id of a record.
pub trait RawRubroId {
    /// First non-blank candidate in the entity's precedence order, trimmed.
    fn raw_rubro_id(&self) -> Option<&str>;
}

fn first_present<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
}

/// `rubro_id`, then `role`.
impl RawRubroId for LaborEstimate {
    fn raw_rubro_id(&self) -> Option<&str> {
        first_present([self.rubro_id.as_deref(), Some(self.role.as_str())])
    }
}

/// `rubro_id`, then `category`.
impl RawRubroId for NonLaborEstimate {
    fn raw_rubro_id(&self) -> Option<&str> {
        first_present([self.rubro_id.as_deref(), Some(self.category.as_str())])
    }
}

/// `rubro_id`, then `line_item_id`, then `category`.
impl RawRubroId for ActualSpendInput {
    fn raw_rubro_id(&self) -> Option<&str> {
        first_present([
            self.rubro_id.as_deref(),
            self.line_item_id.as_deref(),
            self.category.as_deref(),
        ])
    }
}

/// `rubro_id`, then `line_item_id`.
impl RawRubroId for ForecastOverrideInput {
    fn raw_rubro_id(&self) -> Option<&str> {
        first_present([self.rubro_id.as_deref(), self.line_item_id.as_deref()])
    }
}
