//! Inventory records.

use super::trip::UsageMode;
use super::{HouseholdId, LineItemId, StockItemId, StockSheetId, StopId, TripId};
use serde::{Deserialize, Serialize};

/// Named inventory list (pantry, freezer, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSheet {
    pub id: StockSheetId,
    pub household_id: HouseholdId,
    pub name: String,
}

/// On-hand quantity record.
///
/// `trip_id`, `stop_id` and `purchase_id` are only set when the item was derived
/// from a purchase, and are nulled (never cascaded) when that purchase goes away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: StockItemId,
    pub sheet_id: StockSheetId,
    pub household_id: HouseholdId,
    pub name: String,
    pub brand: String,
    pub count: f64,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub usage_mode: UsageMode,
    pub trip_id: Option<TripId>,
    pub stop_id: Option<StopId>,
    pub purchase_id: Option<LineItemId>,
}
