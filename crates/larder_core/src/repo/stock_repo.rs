//! Stock repository: inventory sheets and items.
//!
//! # Invariants
//! - Items belong to exactly one sheet of the same household.
//! - Purchase-derived references (`trip_id`, `stop_id`, `purchase_id`) are only
//!   ever nulled by the unlink statements, never cascaded.

use super::trip_repo::{parse_usage_mode, PropagationScope, SharedFieldChange};
use super::{parse_optional_uuid, parse_uuid, placeholders, uuid_values, RepoError, RepoResult};
use crate::model::stock::{StockItem, StockSheet};
use crate::model::trip::UsageMode;
use crate::model::{
    HouseholdId, LineItemId, StockItemId, StockSheetId, StopId, TripId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    sheet_id,
    household_id,
    name,
    brand,
    count,
    quantity,
    unit,
    unit_price_cents,
    usage_mode,
    trip_id,
    stop_id,
    purchase_id
FROM stock_items";

/// Attributes for a new stock item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStockItem {
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

pub trait StockRepository {
    fn get_or_create_sheet(&self, household_id: HouseholdId, name: &str)
        -> RepoResult<StockSheet>;
    fn get_sheet(&self, id: StockSheetId) -> RepoResult<Option<StockSheet>>;
    /// Fails with `NotFound` when the sheet is missing or owned by another household.
    fn create_item(&self, item: &NewStockItem) -> RepoResult<StockItem>;
    fn get_item(&self, id: StockItemId) -> RepoResult<Option<StockItem>>;
    fn set_usage_mode(&self, id: StockItemId, mode: UsageMode) -> RepoResult<()>;
    fn find_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        name: &str,
    ) -> RepoResult<Option<UsageMode>>;
    fn sync_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        name: &str,
        mode: UsageMode,
        exclude: Option<StockItemId>,
    ) -> RepoResult<usize>;
    /// Nulls `purchase_id` on items derived from these line items.
    fn unlink_purchases(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize>;
    /// Nulls `stop_id` and `purchase_id` on items derived from these stops.
    fn unlink_stops(&self, stop_ids: &[StopId]) -> RepoResult<usize>;
    /// Nulls every purchase-derived reference into this trip.
    fn unlink_trip(&self, trip_id: TripId) -> RepoResult<usize>;
    fn propagation_targets(
        &self,
        scope: &PropagationScope,
        change: &SharedFieldChange,
    ) -> RepoResult<Vec<StockItemId>>;
    fn apply_shared_field(
        &self,
        ids: &[StockItemId],
        change: &SharedFieldChange,
    ) -> RepoResult<usize>;
    fn count_items(&self, household_id: HouseholdId) -> RepoResult<i64>;
}

pub struct SqliteStockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStockRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl StockRepository for SqliteStockRepository<'_> {
    fn get_or_create_sheet(
        &self,
        household_id: HouseholdId,
        name: &str,
    ) -> RepoResult<StockSheet> {
        self.conn.execute(
            "INSERT OR IGNORE INTO stock_sheets (id, household_id, name) VALUES (?1, ?2, ?3);",
            params![Uuid::new_v4().to_string(), household_id.to_string(), name],
        )?;
        let id: String = self.conn.query_row(
            "SELECT id FROM stock_sheets WHERE household_id = ?1 AND name = ?2;",
            params![household_id.to_string(), name],
            |row| row.get(0),
        )?;
        Ok(StockSheet {
            id: parse_uuid(&id, "stock_sheets.id")?,
            household_id,
            name: name.to_string(),
        })
    }

    fn get_sheet(&self, id: StockSheetId) -> RepoResult<Option<StockSheet>> {
        self.conn
            .query_row(
                "SELECT household_id, name FROM stock_sheets WHERE id = ?1;",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .map(|(household_id, name)| {
                Ok(StockSheet {
                    id,
                    household_id: parse_uuid(&household_id, "stock_sheets.household_id")?,
                    name,
                })
            })
            .transpose()
    }

    fn create_item(&self, item: &NewStockItem) -> RepoResult<StockItem> {
        match self.get_sheet(item.sheet_id)? {
            Some(sheet) if sheet.household_id == item.household_id => {}
            _ => return Err(RepoError::not_found("stock sheet", item.sheet_id)),
        }

        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO stock_items (
                id,
                sheet_id,
                household_id,
                name,
                brand,
                count,
                quantity,
                unit,
                unit_price_cents,
                usage_mode,
                trip_id,
                stop_id,
                purchase_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            params![
                id.to_string(),
                item.sheet_id.to_string(),
                item.household_id.to_string(),
                item.name.as_str(),
                item.brand.as_str(),
                item.count,
                item.quantity,
                item.unit.as_deref(),
                item.unit_price_cents,
                item.usage_mode.as_str(),
                item.trip_id.map(|value| value.to_string()),
                item.stop_id.map(|value| value.to_string()),
                item.purchase_id.map(|value| value.to_string()),
            ],
        )?;
        self.get_item(id)?
            .ok_or_else(|| RepoError::not_found("stock item", id))
    }

    fn get_item(&self, id: StockItemId) -> RepoResult<Option<StockItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn set_usage_mode(&self, id: StockItemId, mode: UsageMode) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE stock_items
             SET usage_mode = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), mode.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("stock item", id));
        }
        Ok(())
    }

    fn find_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        name: &str,
    ) -> RepoResult<Option<UsageMode>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT usage_mode
                 FROM stock_items
                 WHERE household_id = ?1
                   AND brand = ?2 COLLATE NOCASE
                   AND name = ?3 COLLATE NOCASE
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1;",
                params![household_id.to_string(), brand, name],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|text| parse_usage_mode(&text, "stock_items.usage_mode"))
            .transpose()
    }

    fn sync_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        name: &str,
        mode: UsageMode,
        exclude: Option<StockItemId>,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE stock_items
             SET usage_mode = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE household_id = ?2
               AND brand = ?3 COLLATE NOCASE
               AND name = ?4 COLLATE NOCASE
               AND usage_mode <> ?1
               AND (?5 IS NULL OR id <> ?5);",
            params![
                mode.as_str(),
                household_id.to_string(),
                brand,
                name,
                exclude.map(|value| value.to_string()),
            ],
        )?;
        Ok(changed)
    }

    fn unlink_purchases(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize> {
        if line_item_ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "UPDATE stock_items
                 SET purchase_id = NULL,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE purchase_id IN ({});",
                placeholders(line_item_ids.len())
            ),
            params_from_iter(uuid_values(line_item_ids)),
        )?;
        Ok(changed)
    }

    fn unlink_stops(&self, stop_ids: &[StopId]) -> RepoResult<usize> {
        if stop_ids.is_empty() {
            return Ok(0);
        }
        let slots = placeholders(stop_ids.len());
        let mut bind_values = uuid_values(stop_ids);
        bind_values.extend(uuid_values(stop_ids));
        let changed = self.conn.execute(
            &format!(
                "UPDATE stock_items
                 SET stop_id = NULL,
                     purchase_id = NULL,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE stop_id IN ({slots})
                    OR purchase_id IN (
                        SELECT id FROM line_items WHERE stop_id IN ({slots})
                    );"
            ),
            params_from_iter(bind_values),
        )?;
        Ok(changed)
    }

    fn unlink_trip(&self, trip_id: TripId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE stock_items
             SET trip_id = NULL,
                 stop_id = NULL,
                 purchase_id = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE trip_id = ?1
                OR stop_id IN (SELECT id FROM stops WHERE trip_id = ?1)
                OR purchase_id IN (
                    SELECT li.id
                    FROM line_items li
                    INNER JOIN stops s ON s.id = li.stop_id
                    WHERE s.trip_id = ?1
                );",
            [trip_id.to_string()],
        )?;
        Ok(changed)
    }

    fn propagation_targets(
        &self,
        scope: &PropagationScope,
        change: &SharedFieldChange,
    ) -> RepoResult<Vec<StockItemId>> {
        let sql = format!(
            "SELECT si.id
             FROM stock_items si
             INNER JOIN stops s ON s.id = si.stop_id
             LEFT JOIN stores st ON st.id = s.store_id
             WHERE si.household_id = ?1
               AND COALESCE(st.name, s.store_name) = ?2
               AND si.brand = ?3
               AND si.{} IS ?4
             ORDER BY si.rowid ASC;",
            change.column()
        );
        let bind_values = vec![
            Value::Text(scope.household_id.to_string()),
            Value::Text(scope.store_name.clone()),
            Value::Text(scope.brand.clone()),
            change.old_value(),
        ];
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "stock_items.id")?);
        }
        Ok(ids)
    }

    fn apply_shared_field(
        &self,
        ids: &[StockItemId],
        change: &SharedFieldChange,
    ) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE stock_items
             SET {} = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id IN ({});",
            change.column(),
            placeholders(ids.len())
        );
        let mut bind_values = vec![change.new_value()];
        bind_values.extend(uuid_values(ids));
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn count_items(&self, household_id: HouseholdId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM stock_items WHERE household_id = ?1;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<StockItem> {
    let id: String = row.get("id")?;
    let sheet_id: String = row.get("sheet_id")?;
    let household_id: String = row.get("household_id")?;
    let usage_mode: String = row.get("usage_mode")?;
    Ok(StockItem {
        id: parse_uuid(&id, "stock_items.id")?,
        sheet_id: parse_uuid(&sheet_id, "stock_items.sheet_id")?,
        household_id: parse_uuid(&household_id, "stock_items.household_id")?,
        name: row.get("name")?,
        brand: row.get("brand")?,
        count: row.get("count")?,
        quantity: row.get("quantity")?,
        unit: row.get("unit")?,
        unit_price_cents: row.get("unit_price_cents")?,
        usage_mode: parse_usage_mode(&usage_mode, "stock_items.usage_mode")?,
        trip_id: parse_optional_uuid(row.get("trip_id")?, "stock_items.trip_id")?,
        stop_id: parse_optional_uuid(row.get("stop_id")?, "stock_items.stop_id")?,
        purchase_id: parse_optional_uuid(row.get("purchase_id")?, "stock_items.purchase_id")?,
    })
}
