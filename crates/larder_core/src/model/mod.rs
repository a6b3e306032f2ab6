//! Domain model for the purchase reconciliation engine.
//!
//! # Responsibility
//! - Define the records shared by the trip, ledger, stock and learning domains.
//! - Keep identifier aliases explicit in signatures.
//!
//! # Invariants
//! - Every persisted record is identified by a stable UUID.
//! - Money is carried as integer minor units (`*_cents`).

use uuid::Uuid;

pub mod learning;
pub mod ledger;
pub mod schedule;
pub mod stock;
pub mod tag;
pub mod trip;

pub type HouseholdId = Uuid;
pub type UserId = Uuid;
pub type StoreId = Uuid;
pub type TripId = Uuid;
pub type StopId = Uuid;
pub type LineItemId = Uuid;
pub type LedgerSourceId = Uuid;
pub type LedgerEntryId = Uuid;
pub type StockSheetId = Uuid;
pub type StockItemId = Uuid;
pub type TagId = Uuid;
pub type TaskId = Uuid;
