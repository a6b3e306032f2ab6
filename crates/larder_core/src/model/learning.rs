//! Self-learning records: brand defaults, text corrections and tax meanings.
//!
//! # Invariants
//! - Catalog entries are keyed by (household, brand) case-insensitively and are
//!   overwritten, never merged.
//! - Corrections are keyed by (household, normalized raw text).
//! - Tax rules are keyed by (household, store, indicator) case-insensitively.

use super::{HouseholdId, TagId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Learned defaults for one brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub household_id: HouseholdId,
    pub name: String,
    pub default_item: Option<String>,
    pub default_unit: Option<String>,
    pub default_quantity: Option<f64>,
    pub default_tag_ids: Vec<TagId>,
}

/// Fields a correction rewrites. Absent fields carry no opinion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price_cents: Option<i64>,
}

impl CorrectedFields {
    pub fn is_empty(&self) -> bool {
        self.brand.is_none()
            && self.item_name.is_none()
            && self.unit.is_none()
            && self.quantity.is_none()
            && self.unit_price_cents.is_none()
    }
}

/// Learned raw receipt text mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: Uuid,
    pub household_id: HouseholdId,
    pub raw_text: String,
    pub fields: CorrectedFields,
}

/// Learned meaning of a receipt tax indicator at one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRule {
    pub id: Uuid,
    pub household_id: HouseholdId,
    pub store_name: String,
    pub indicator: String,
    pub is_taxable: bool,
    /// Fraction in `[0, 1]`, e.g. `0.0625`.
    pub rate: Option<f64>,
}
