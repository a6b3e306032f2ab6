//! Trip repository: stores, shopping events, stops and line items.
//!
//! # Responsibility
//! - Persist the Trip → Stop → LineItem hierarchy.
//! - Provide the bulk statements used by propagation and usage-mode sync.
//! - Provide the delete primitives the cascade policy is composed from.
//!
//! # Invariants
//! - Stop positions are dense per trip, assigned in creation order.
//! - Store identity for propagation is the resolved display name: the store
//!   row name, else the stop's freeform name.
//! - Delete primitives never unlink foreign references themselves; callers run
//!   unlink statements first inside the same transaction.

use super::tag_repo::load_tag_ids;
use super::{
    bool_to_int, parse_bool, parse_optional_uuid, parse_uuid, placeholders, uuid_values,
    RepoError, RepoResult,
};
use crate::model::trip::{LineItem, ShoppingEvent, Stop, Store, UsageMode};
use crate::model::{HouseholdId, LedgerEntryId, LineItemId, StopId, StoreId, TripId, UserId};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

const TRIP_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    driver_id,
    started_at,
    ended_at,
    notes
FROM shopping_events";

const STOP_SELECT_SQL: &str = "SELECT
    id,
    trip_id,
    store_id,
    store_name,
    position
FROM stops";

const LINE_ITEM_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    user_id,
    stop_id,
    ledger_entry_id,
    brand,
    item_name,
    count,
    quantity,
    unit,
    unit_price_cents,
    total_cents,
    taxable,
    usage_mode,
    purchased_on
FROM line_items";

/// Attributes for a new store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStore {
    pub household_id: HouseholdId,
    pub name: String,
    pub code: Option<String>,
}

/// Attributes for a new shopping event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrip {
    pub household_id: HouseholdId,
    pub driver_id: Option<UserId>,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

/// A shared field edit, carrying the value matched on and the value written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharedFieldChange {
    Brand { old: String, new: String },
    Unit { old: Option<String>, new: Option<String> },
    UnitPrice { old: i64, new: i64 },
}

impl SharedFieldChange {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Brand { .. } => "brand",
            Self::Unit { .. } => "unit",
            Self::UnitPrice { .. } => "unit_price_cents",
        }
    }

    pub(crate) fn old_value(&self) -> Value {
        match self {
            Self::Brand { old, .. } => Value::Text(old.clone()),
            Self::Unit { old, .. } => optional_text(old),
            Self::UnitPrice { old, .. } => Value::Integer(*old),
        }
    }

    pub(crate) fn new_value(&self) -> Value {
        match self {
            Self::Brand { new, .. } => Value::Text(new.clone()),
            Self::Unit { new, .. } => optional_text(new),
            Self::UnitPrice { new, .. } => Value::Integer(*new),
        }
    }
}

/// Records considered siblings by propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationScope {
    pub household_id: HouseholdId,
    pub store_name: String,
    pub brand: String,
}

/// Line item id paired with the ledger entry it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItemLink {
    pub line_item_id: LineItemId,
    pub ledger_entry_id: LedgerEntryId,
}

pub trait TripRepository {
    fn create_store(&self, store: &NewStore) -> RepoResult<Store>;
    fn get_store(&self, id: StoreId) -> RepoResult<Option<Store>>;
    /// Finds a household store whose name or code matches, case-insensitively.
    fn find_store(&self, household_id: HouseholdId, name_or_code: &str)
        -> RepoResult<Option<Store>>;

    fn create_trip(&self, trip: &NewTrip) -> RepoResult<ShoppingEvent>;
    fn get_trip(&self, id: TripId) -> RepoResult<Option<ShoppingEvent>>;
    /// Returns the earliest household trip starting on `date`.
    fn find_trip_on(
        &self,
        household_id: HouseholdId,
        date: NaiveDate,
    ) -> RepoResult<Option<ShoppingEvent>>;
    fn list_trips(&self, household_id: HouseholdId) -> RepoResult<Vec<ShoppingEvent>>;
    fn delete_trip(&self, id: TripId) -> RepoResult<usize>;

    /// Appends a stop at the next position of `trip_id`.
    fn create_stop(
        &self,
        trip_id: TripId,
        store_id: Option<StoreId>,
        store_name: Option<&str>,
    ) -> RepoResult<Stop>;
    fn get_stop(&self, id: StopId) -> RepoResult<Option<Stop>>;
    fn list_stops(&self, trip_id: TripId) -> RepoResult<Vec<Stop>>;
    /// Resolved store display name of a stop.
    fn stop_store_name(&self, stop_id: StopId) -> RepoResult<Option<String>>;
    fn delete_stops(&self, ids: &[StopId]) -> RepoResult<usize>;

    fn insert_line_item(&self, item: &LineItem) -> RepoResult<()>;
    fn get_line_item(&self, id: LineItemId) -> RepoResult<Option<LineItem>>;
    fn list_line_items(&self, stop_id: StopId) -> RepoResult<Vec<LineItem>>;
    fn update_line_item(&self, item: &LineItem) -> RepoResult<()>;
    fn line_item_links(&self, stop_ids: &[StopId]) -> RepoResult<Vec<LineItemLink>>;
    fn delete_line_items(&self, ids: &[LineItemId]) -> RepoResult<usize>;

    /// Usage mode already recorded for a (brand, item) pair, if any.
    fn find_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        item_name: &str,
    ) -> RepoResult<Option<UsageMode>>;
    /// Sets `mode` on every matching line item except `exclude`.
    fn sync_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        item_name: &str,
        mode: UsageMode,
        exclude: Option<LineItemId>,
    ) -> RepoResult<usize>;

    /// Line items in scope whose current field value equals the old value.
    fn propagation_targets(
        &self,
        scope: &PropagationScope,
        change: &SharedFieldChange,
        exclude: LineItemId,
    ) -> RepoResult<Vec<LineItemId>>;
    /// Writes the new value; a price change also recomputes line totals.
    fn apply_shared_field(
        &self,
        ids: &[LineItemId],
        change: &SharedFieldChange,
    ) -> RepoResult<usize>;

    fn count_trips(&self, household_id: HouseholdId) -> RepoResult<i64>;
    fn count_stops(&self, household_id: HouseholdId) -> RepoResult<i64>;
    fn count_line_items(&self, household_id: HouseholdId) -> RepoResult<i64>;
}

pub struct SqliteTripRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTripRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TripRepository for SqliteTripRepository<'_> {
    fn create_store(&self, store: &NewStore) -> RepoResult<Store> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO stores (id, household_id, name, code) VALUES (?1, ?2, ?3, ?4);",
            params![
                id.to_string(),
                store.household_id.to_string(),
                store.name.as_str(),
                store.code.as_deref(),
            ],
        )?;
        Ok(Store {
            id,
            household_id: store.household_id,
            name: store.name.clone(),
            code: store.code.clone(),
        })
    }

    fn get_store(&self, id: StoreId) -> RepoResult<Option<Store>> {
        self.conn
            .query_row(
                "SELECT id, household_id, name, code FROM stores WHERE id = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?
            .map(parse_store)
            .transpose()
    }

    fn find_store(
        &self,
        household_id: HouseholdId,
        name_or_code: &str,
    ) -> RepoResult<Option<Store>> {
        self.conn
            .query_row(
                "SELECT id, household_id, name, code
                 FROM stores
                 WHERE household_id = ?1
                   AND (name = ?2 COLLATE NOCASE OR code = ?2 COLLATE NOCASE)
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1;",
                params![household_id.to_string(), name_or_code],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?
            .map(parse_store)
            .transpose()
    }

    fn create_trip(&self, trip: &NewTrip) -> RepoResult<ShoppingEvent> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO shopping_events (
                id,
                household_id,
                driver_id,
                started_at,
                ended_at,
                notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                trip.household_id.to_string(),
                trip.driver_id.map(|value| value.to_string()),
                trip.started_at,
                trip.ended_at,
                trip.notes.as_deref(),
            ],
        )?;
        Ok(ShoppingEvent {
            id,
            household_id: trip.household_id,
            driver_id: trip.driver_id,
            started_at: trip.started_at,
            ended_at: trip.ended_at,
            notes: trip.notes.clone(),
        })
    }

    fn get_trip(&self, id: TripId) -> RepoResult<Option<ShoppingEvent>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TRIP_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_trip_row(row)?));
        }
        Ok(None)
    }

    fn find_trip_on(
        &self,
        household_id: HouseholdId,
        date: NaiveDate,
    ) -> RepoResult<Option<ShoppingEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TRIP_SELECT_SQL}
             WHERE household_id = ?1
               AND substr(started_at, 1, 10) = ?2
             ORDER BY started_at ASC, created_at ASC, rowid ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![
            household_id.to_string(),
            date.format("%Y-%m-%d").to_string()
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_trip_row(row)?));
        }
        Ok(None)
    }

    fn list_trips(&self, household_id: HouseholdId) -> RepoResult<Vec<ShoppingEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TRIP_SELECT_SQL}
             WHERE household_id = ?1
             ORDER BY started_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([household_id.to_string()])?;
        let mut trips = Vec::new();
        while let Some(row) = rows.next()? {
            trips.push(parse_trip_row(row)?);
        }
        Ok(trips)
    }

    fn delete_trip(&self, id: TripId) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM shopping_events WHERE id = ?1;", [id.to_string()])?;
        Ok(changed)
    }

    fn create_stop(
        &self,
        trip_id: TripId,
        store_id: Option<StoreId>,
        store_name: Option<&str>,
    ) -> RepoResult<Stop> {
        let id = Uuid::new_v4();
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM stops WHERE trip_id = ?1;",
            [trip_id.to_string()],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO stops (id, trip_id, store_id, store_name, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                id.to_string(),
                trip_id.to_string(),
                store_id.map(|value| value.to_string()),
                store_name,
                position,
            ],
        )?;
        Ok(Stop {
            id,
            trip_id,
            store_id,
            store_name: store_name.map(str::to_string),
            position,
        })
    }

    fn get_stop(&self, id: StopId) -> RepoResult<Option<Stop>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STOP_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_stop_row(row)?));
        }
        Ok(None)
    }

    fn list_stops(&self, trip_id: TripId) -> RepoResult<Vec<Stop>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STOP_SELECT_SQL} WHERE trip_id = ?1 ORDER BY position ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([trip_id.to_string()])?;
        let mut stops = Vec::new();
        while let Some(row) = rows.next()? {
            stops.push(parse_stop_row(row)?);
        }
        Ok(stops)
    }

    fn stop_store_name(&self, stop_id: StopId) -> RepoResult<Option<String>> {
        let name: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT COALESCE(st.name, s.store_name)
                 FROM stops s
                 LEFT JOIN stores st ON st.id = s.store_id
                 WHERE s.id = ?1;",
                [stop_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten())
    }

    fn delete_stops(&self, ids: &[StopId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!("DELETE FROM stops WHERE id IN ({});", placeholders(ids.len())),
            params_from_iter(uuid_values(ids)),
        )?;
        Ok(changed)
    }

    fn insert_line_item(&self, item: &LineItem) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO line_items (
                id,
                household_id,
                user_id,
                stop_id,
                ledger_entry_id,
                brand,
                item_name,
                count,
                quantity,
                unit,
                unit_price_cents,
                total_cents,
                taxable,
                usage_mode,
                purchased_on
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params![
                item.id.to_string(),
                item.household_id.to_string(),
                item.user_id.to_string(),
                item.stop_id.map(|value| value.to_string()),
                item.ledger_entry_id.to_string(),
                item.brand.as_str(),
                item.item_name.as_str(),
                item.count,
                item.quantity,
                item.unit.as_deref(),
                item.unit_price_cents,
                item.total_cents,
                bool_to_int(item.taxable),
                item.usage_mode.as_str(),
                item.purchased_on,
            ],
        )?;
        Ok(())
    }

    fn get_line_item(&self, id: LineItemId) -> RepoResult<Option<LineItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{LINE_ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_line_item_row(self.conn, row)?));
        }
        Ok(None)
    }

    fn list_line_items(&self, stop_id: StopId) -> RepoResult<Vec<LineItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LINE_ITEM_SELECT_SQL} WHERE stop_id = ?1 ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([stop_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_line_item_row(self.conn, row)?);
        }
        Ok(items)
    }

    fn update_line_item(&self, item: &LineItem) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE line_items
             SET
                stop_id = ?2,
                brand = ?3,
                item_name = ?4,
                count = ?5,
                quantity = ?6,
                unit = ?7,
                unit_price_cents = ?8,
                total_cents = ?9,
                taxable = ?10,
                usage_mode = ?11,
                purchased_on = ?12,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                item.id.to_string(),
                item.stop_id.map(|value| value.to_string()),
                item.brand.as_str(),
                item.item_name.as_str(),
                item.count,
                item.quantity,
                item.unit.as_deref(),
                item.unit_price_cents,
                item.total_cents,
                bool_to_int(item.taxable),
                item.usage_mode.as_str(),
                item.purchased_on,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("line item", item.id));
        }
        Ok(())
    }

    fn line_item_links(&self, stop_ids: &[StopId]) -> RepoResult<Vec<LineItemLink>> {
        if stop_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, ledger_entry_id FROM line_items WHERE stop_id IN ({});",
            placeholders(stop_ids.len())
        ))?;
        let mut rows = stmt.query(params_from_iter(uuid_values(stop_ids)))?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            let line_item_id: String = row.get(0)?;
            let ledger_entry_id: String = row.get(1)?;
            links.push(LineItemLink {
                line_item_id: parse_uuid(&line_item_id, "line_items.id")?,
                ledger_entry_id: parse_uuid(&ledger_entry_id, "line_items.ledger_entry_id")?,
            });
        }
        Ok(links)
    }

    fn delete_line_items(&self, ids: &[LineItemId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM line_items WHERE id IN ({});",
                placeholders(ids.len())
            ),
            params_from_iter(uuid_values(ids)),
        )?;
        Ok(changed)
    }

    fn find_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        item_name: &str,
    ) -> RepoResult<Option<UsageMode>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT usage_mode
                 FROM line_items
                 WHERE household_id = ?1
                   AND brand = ?2 COLLATE NOCASE
                   AND item_name = ?3 COLLATE NOCASE
                 ORDER BY updated_at DESC, rowid DESC
                 LIMIT 1;",
                params![household_id.to_string(), brand, item_name],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|text| parse_usage_mode(&text, "line_items.usage_mode"))
            .transpose()
    }

    fn sync_usage_mode(
        &self,
        household_id: HouseholdId,
        brand: &str,
        item_name: &str,
        mode: UsageMode,
        exclude: Option<LineItemId>,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE line_items
             SET usage_mode = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE household_id = ?2
               AND brand = ?3 COLLATE NOCASE
               AND item_name = ?4 COLLATE NOCASE
               AND usage_mode <> ?1
               AND (?5 IS NULL OR id <> ?5);",
            params![
                mode.as_str(),
                household_id.to_string(),
                brand,
                item_name,
                exclude.map(|value| value.to_string()),
            ],
        )?;
        Ok(changed)
    }

    fn propagation_targets(
        &self,
        scope: &PropagationScope,
        change: &SharedFieldChange,
        exclude: LineItemId,
    ) -> RepoResult<Vec<LineItemId>> {
        let sql = format!(
            "SELECT li.id
             FROM line_items li
             INNER JOIN stops s ON s.id = li.stop_id
             LEFT JOIN stores st ON st.id = s.store_id
             WHERE li.household_id = ?1
               AND COALESCE(st.name, s.store_name) = ?2
               AND li.brand = ?3
               AND li.{} IS ?4
               AND li.id <> ?5
             ORDER BY li.rowid ASC;",
            change.column()
        );
        let bind_values = vec![
            Value::Text(scope.household_id.to_string()),
            Value::Text(scope.store_name.clone()),
            Value::Text(scope.brand.clone()),
            change.old_value(),
            Value::Text(exclude.to_string()),
        ];
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "line_items.id")?);
        }
        Ok(ids)
    }

    fn apply_shared_field(
        &self,
        ids: &[LineItemId],
        change: &SharedFieldChange,
    ) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let assignment = match change {
            SharedFieldChange::UnitPrice { .. } => {
                "unit_price_cents = ?1, total_cents = CAST(ROUND(count * ?1) AS INTEGER)"
                    .to_string()
            }
            other => format!("{} = ?1", other.column()),
        };
        let sql = format!(
            "UPDATE line_items
             SET {assignment},
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id IN ({});",
            placeholders(ids.len())
        );
        let mut bind_values = vec![change.new_value()];
        bind_values.extend(uuid_values(ids));
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(changed)
    }

    fn count_trips(&self, household_id: HouseholdId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM shopping_events WHERE household_id = ?1;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_stops(&self, household_id: HouseholdId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*)
             FROM stops s
             INNER JOIN shopping_events t ON t.id = s.trip_id
             WHERE t.household_id = ?1;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_line_items(&self, household_id: HouseholdId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM line_items WHERE household_id = ?1;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn optional_text(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text.clone()),
        None => Value::Null,
    }
}

pub(crate) fn parse_usage_mode(value: &str, column: &'static str) -> RepoResult<UsageMode> {
    UsageMode::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid usage mode `{value}` in {column}")))
}

fn parse_store(
    (id, household_id, name, code): (String, String, String, Option<String>),
) -> RepoResult<Store> {
    Ok(Store {
        id: parse_uuid(&id, "stores.id")?,
        household_id: parse_uuid(&household_id, "stores.household_id")?,
        name,
        code,
    })
}

fn parse_trip_row(row: &Row<'_>) -> RepoResult<ShoppingEvent> {
    let id: String = row.get("id")?;
    let household_id: String = row.get("household_id")?;
    Ok(ShoppingEvent {
        id: parse_uuid(&id, "shopping_events.id")?,
        household_id: parse_uuid(&household_id, "shopping_events.household_id")?,
        driver_id: parse_optional_uuid(row.get("driver_id")?, "shopping_events.driver_id")?,
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        notes: row.get("notes")?,
    })
}

fn parse_stop_row(row: &Row<'_>) -> RepoResult<Stop> {
    let id: String = row.get("id")?;
    let trip_id: String = row.get("trip_id")?;
    Ok(Stop {
        id: parse_uuid(&id, "stops.id")?,
        trip_id: parse_uuid(&trip_id, "stops.trip_id")?,
        store_id: parse_optional_uuid(row.get("store_id")?, "stops.store_id")?,
        store_name: row.get("store_name")?,
        position: row.get("position")?,
    })
}

fn parse_line_item_row(conn: &Connection, row: &Row<'_>) -> RepoResult<LineItem> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "line_items.id")?;
    let household_id: String = row.get("household_id")?;
    let user_id: String = row.get("user_id")?;
    let ledger_entry_id: String = row.get("ledger_entry_id")?;
    let usage_mode: String = row.get("usage_mode")?;
    Ok(LineItem {
        id,
        household_id: parse_uuid(&household_id, "line_items.household_id")?,
        user_id: parse_uuid(&user_id, "line_items.user_id")?,
        stop_id: parse_optional_uuid(row.get("stop_id")?, "line_items.stop_id")?,
        ledger_entry_id: parse_uuid(&ledger_entry_id, "line_items.ledger_entry_id")?,
        brand: row.get("brand")?,
        item_name: row.get("item_name")?,
        count: row.get("count")?,
        quantity: row.get("quantity")?,
        unit: row.get("unit")?,
        unit_price_cents: row.get("unit_price_cents")?,
        total_cents: row.get("total_cents")?,
        taxable: parse_bool(row.get("taxable")?, "line_items.taxable")?,
        usage_mode: parse_usage_mode(&usage_mode, "line_items.usage_mode")?,
        purchased_on: row.get("purchased_on")?,
        tag_ids: load_tag_ids(conn, "line_item_tags", "line_item_id", id)?,
    })
}
