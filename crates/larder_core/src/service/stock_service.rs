//! Stock use-case service.
//!
//! # Responsibility
//! - Create standalone stock items on a named or default sheet.
//! - Change an item's usage mode and fan the change out household-wide.

use super::error::{ReconcileError, ReconcileResult};
use super::usage_sync::{existing_usage_mode, sync_usage_mode, SyncOrigin, UsageSyncReport};
use crate::config::EngineConfig;
use crate::model::stock::StockItem;
use crate::model::trip::UsageMode;
use crate::model::{HouseholdId, StockItemId};
use crate::repo::stock_repo::{NewStockItem, SqliteStockRepository, StockRepository};
use log::{error, info};
use rusqlite::Connection;

/// Attributes for a stock item that is not derived from a purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct StockItemInput {
    pub household_id: HouseholdId,
    /// Sheet name; the configured default sheet when absent.
    pub sheet: Option<String>,
    pub name: String,
    pub brand: String,
    pub count: f64,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price_cents: Option<i64>,
    /// Explicit mode triggers a household-wide sync.
    pub usage_mode: Option<UsageMode>,
}

pub struct StockService<'conn> {
    conn: &'conn Connection,
    default_sheet: String,
}

impl<'conn> StockService<'conn> {
    pub fn new(conn: &'conn Connection, config: &EngineConfig) -> Self {
        Self {
            conn,
            default_sheet: config.default_stock_sheet.clone(),
        }
    }

    pub fn create_item(&self, input: &StockItemInput) -> ReconcileResult<StockItem> {
        let name = input.name.trim();
        let brand = input.brand.trim();
        if name.is_empty() || brand.is_empty() {
            return Err(ReconcileError::validation(
                "stock item name and brand cannot be blank",
            ));
        }
        if !(input.count.is_finite() && input.count >= 0.0) {
            return Err(ReconcileError::validation(
                "stock count must be a non-negative number",
            ));
        }
        if input.unit_price_cents.is_some_and(|price| price < 0) {
            return Err(ReconcileError::validation("unit price cannot be negative"));
        }
        let sheet_name = input
            .sheet
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.default_sheet.as_str());

        let repo = SqliteStockRepository::new(self.conn);
        let usage_mode = match input.usage_mode {
            Some(mode) => mode,
            None => existing_usage_mode(self.conn, input.household_id, brand, name)?
                .unwrap_or_default(),
        };
        let sheet = repo.get_or_create_sheet(input.household_id, sheet_name)?;
        let item = repo.create_item(&NewStockItem {
            sheet_id: sheet.id,
            household_id: input.household_id,
            name: name.to_string(),
            brand: brand.to_string(),
            count: input.count,
            quantity: input.quantity,
            unit: input.unit.clone(),
            unit_price_cents: input.unit_price_cents,
            usage_mode,
            trip_id: None,
            stop_id: None,
            purchase_id: None,
        })?;
        info!(
            "event=stock_item_create module=stock status=ok stock_item_id={} sheet_id={}",
            item.id, sheet.id
        );

        if input.usage_mode.is_some() {
            sync_usage_mode(
                self.conn,
                item.household_id,
                &item.brand,
                &item.name,
                usage_mode,
                SyncOrigin::StockItem(item.id),
            )
            .map_err(|source| ReconcileError::PartiallyApplied {
                committed_id: item.id,
                source,
            })?;
        }
        Ok(item)
    }

    /// Sets the item's mode, then syncs every matching line item and stock
    /// item in the household.
    pub fn set_stock_usage_mode(
        &self,
        id: StockItemId,
        mode: UsageMode,
    ) -> ReconcileResult<UsageSyncReport> {
        let repo = SqliteStockRepository::new(self.conn);
        let item = repo
            .get_item(id)?
            .ok_or_else(|| ReconcileError::not_found("stock item", id))?;
        repo.set_usage_mode(id, mode)?;

        sync_usage_mode(
            self.conn,
            item.household_id,
            &item.brand,
            &item.name,
            mode,
            SyncOrigin::StockItem(id),
        )
        .map_err(|source| {
            error!(
                "event=usage_sync module=classification status=error stock_item_id={} error={}",
                id, source
            );
            ReconcileError::PartiallyApplied {
                committed_id: id,
                source,
            }
        })
    }

    pub fn get_item(&self, id: StockItemId) -> ReconcileResult<Option<StockItem>> {
        Ok(SqliteStockRepository::new(self.conn).get_item(id)?)
    }
}
