//! Household-wide `usage_mode` consistency.
//!
//! # Invariants
//! - Matching is by case-insensitive (brand, item name) within one household.
//! - The triggering row is excluded; it was already written by the caller.
//! - Runs as autocommit bulk statements, outside the triggering transaction.

use crate::model::trip::UsageMode;
use crate::model::{HouseholdId, LineItemId, StockItemId};
use crate::repo::stock_repo::{SqliteStockRepository, StockRepository};
use crate::repo::trip_repo::{SqliteTripRepository, TripRepository};
use crate::repo::RepoResult;
use log::info;
use rusqlite::Connection;
use std::collections::HashSet;

/// Row counts touched by one usage-mode sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSyncReport {
    pub line_items: usize,
    pub stock_items: usize,
}

impl UsageSyncReport {
    pub(crate) fn absorb(&mut self, other: UsageSyncReport) {
        self.line_items += other.line_items;
        self.stock_items += other.stock_items;
    }
}

/// The write that changed a usage mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncOrigin {
    LineItem(LineItemId),
    StockItem(StockItemId),
}

pub(crate) fn sync_usage_mode(
    conn: &Connection,
    household_id: HouseholdId,
    brand: &str,
    item_name: &str,
    mode: UsageMode,
    origin: SyncOrigin,
) -> RepoResult<UsageSyncReport> {
    let (line_exclude, stock_exclude) = match origin {
        SyncOrigin::LineItem(id) => (Some(id), None),
        SyncOrigin::StockItem(id) => (None, Some(id)),
    };
    let line_items = SqliteTripRepository::new(conn).sync_usage_mode(
        household_id,
        brand,
        item_name,
        mode,
        line_exclude,
    )?;
    let stock_items = SqliteStockRepository::new(conn).sync_usage_mode(
        household_id,
        brand,
        item_name,
        mode,
        stock_exclude,
    )?;
    info!(
        "event=usage_sync module=classification status=ok household_id={} mode={} line_items={} stock_items={}",
        household_id,
        mode.as_str(),
        line_items,
        stock_items
    );
    Ok(UsageSyncReport {
        line_items,
        stock_items,
    })
}

/// Mode already used by a matching line item, else a matching stock item.
pub(crate) fn existing_usage_mode(
    conn: &Connection,
    household_id: HouseholdId,
    brand: &str,
    item_name: &str,
) -> RepoResult<Option<UsageMode>> {
    if let Some(mode) =
        SqliteTripRepository::new(conn).find_usage_mode(household_id, brand, item_name)?
    {
        return Ok(Some(mode));
    }
    SqliteStockRepository::new(conn).find_usage_mode(household_id, brand, item_name)
}

/// Modes already used by `(brand, item)` pairs that renamed rows are about to
/// join. Must run before the rename. Names are deduplicated like `COLLATE NOCASE`;
/// pairs with no rows yet are omitted.
pub(crate) fn modes_for_rename(
    conn: &Connection,
    household_id: HouseholdId,
    brand: &str,
    item_names: &[String],
) -> RepoResult<Vec<(String, UsageMode)>> {
    let mut seen = HashSet::new();
    let mut modes = Vec::new();
    for name in item_names {
        if !seen.insert(name.to_ascii_lowercase()) {
            continue;
        }
        if let Some(mode) = existing_usage_mode(conn, household_id, brand, name)? {
            modes.push((name.clone(), mode));
        }
    }
    Ok(modes)
}
