//! Trip hierarchy records: shopping events, stops and line items.
//!
//! # Invariants
//! - A stop names either a known store or a freeform store name.
//! - Every line item references exactly one ledger entry.
//! - `usage_mode` is shared by every record with the same case-insensitive
//!   (brand, item name) pair inside one household.

use super::{
    HouseholdId, LedgerEntryId, LineItemId, StopId, StoreId, TagId, TripId, UserId,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How stock derived from a purchase is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMode {
    /// Whole packages are used up one at a time.
    #[default]
    Count,
    /// Partial amounts are drawn from a package.
    Quantity,
}

impl UsageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Quantity => "quantity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "count" => Some(Self::Count),
            "quantity" => Some(Self::Quantity),
            _ => None,
        }
    }
}

/// A known store a household shops at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub household_id: HouseholdId,
    pub name: String,
    /// Short code printed on receipts, if any.
    pub code: Option<String>,
}

/// One shopping outing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingEvent {
    pub id: TripId,
    pub household_id: HouseholdId,
    pub driver_id: Option<UserId>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl ShoppingEvent {
    /// Calendar day used for same-day consolidation.
    pub fn trip_date(&self) -> NaiveDate {
        self.started_at.date()
    }
}

/// One store visit inside a shopping event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub trip_id: TripId,
    pub store_id: Option<StoreId>,
    /// Freeform name used when the stop is not bound to a known store.
    pub store_name: Option<String>,
    /// Zero-based order within the trip.
    pub position: i64,
}

/// One purchased product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub stop_id: Option<StopId>,
    pub ledger_entry_id: LedgerEntryId,
    pub brand: String,
    pub item_name: String,
    /// Number of packages bought.
    pub count: f64,
    /// Amount per package, measured in `unit`.
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub taxable: bool,
    pub usage_mode: UsageMode,
    pub purchased_on: NaiveDate,
    pub tag_ids: Vec<TagId>,
}
