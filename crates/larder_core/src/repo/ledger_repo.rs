//! Ledger repository: income/expense sources and entries.
//!
//! # Invariants
//! - Source lookup by name is exact and case-sensitive.
//! - `ledger_entries.line_item_id` is unique when set (1:1 with line items).
//! - Entry back-references are detached before the referenced line items are
//!   deleted.

use super::tag_repo::load_tag_ids;
use super::{
    bool_to_int, parse_bool, parse_optional_uuid, parse_uuid, placeholders, uuid_values,
    RepoError, RepoResult,
};
use crate::model::ledger::{EntryKind, LedgerEntry, LedgerSource};
use crate::model::{HouseholdId, LedgerEntryId, LedgerSourceId, LineItemId, UserId};
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const SOURCE_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    user_id,
    name,
    kind,
    amount_cents,
    recurring
FROM ledger_sources";

const ENTRY_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    user_id,
    entry_date,
    amount_cents,
    kind,
    source_id,
    line_item_id,
    description
FROM ledger_entries";

/// Attributes for a new ledger source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerSource {
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub name: String,
    pub kind: EntryKind,
    pub amount_cents: i64,
    pub recurring: bool,
}

/// Attributes for a new ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub entry_date: NaiveDate,
    pub amount_cents: i64,
    pub kind: EntryKind,
    pub source_id: LedgerSourceId,
    pub line_item_id: Option<LineItemId>,
    pub description: Option<String>,
}

/// Partial update of a ledger entry. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerEntryUpdate {
    pub entry_date: Option<NaiveDate>,
    pub amount_cents: Option<i64>,
    pub source_id: Option<LedgerSourceId>,
    pub line_item_id: Option<Option<LineItemId>>,
    pub description: Option<Option<String>>,
}

pub trait LedgerRepository {
    fn create_source(&self, source: &NewLedgerSource) -> RepoResult<LedgerSource>;
    fn get_source(&self, id: LedgerSourceId) -> RepoResult<Option<LedgerSource>>;
    /// Lists sources with exactly this name and kind, oldest first.
    fn find_sources(
        &self,
        household_id: HouseholdId,
        name: &str,
        kind: EntryKind,
    ) -> RepoResult<Vec<LedgerSource>>;
    fn create_entry(&self, entry: &NewLedgerEntry) -> RepoResult<LedgerEntry>;
    fn get_entry(&self, id: LedgerEntryId) -> RepoResult<Option<LedgerEntry>>;
    fn update_entry(
        &self,
        id: LedgerEntryId,
        update: &LedgerEntryUpdate,
    ) -> RepoResult<LedgerEntry>;
    /// Nulls the back-reference of every entry pointing at these line items.
    fn detach_line_items(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize>;
    fn delete_entries(&self, ids: &[LedgerEntryId]) -> RepoResult<usize>;
    /// Copies each line item's total onto the entry it owns.
    fn sync_amounts_from_line_items(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize>;
    fn count_entries(&self, household_id: HouseholdId) -> RepoResult<i64>;
}

pub struct SqliteLedgerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedgerRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn create_source(&self, source: &NewLedgerSource) -> RepoResult<LedgerSource> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO ledger_sources (
                id,
                household_id,
                user_id,
                name,
                kind,
                amount_cents,
                recurring
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id.to_string(),
                source.household_id.to_string(),
                source.user_id.to_string(),
                source.name.as_str(),
                source.kind.as_str(),
                source.amount_cents,
                bool_to_int(source.recurring),
            ],
        )?;
        self.get_source(id)?
            .ok_or_else(|| RepoError::not_found("ledger source", id))
    }

    fn get_source(&self, id: LedgerSourceId) -> RepoResult<Option<LedgerSource>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SOURCE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_source_row(row)?));
        }
        Ok(None)
    }

    fn find_sources(
        &self,
        household_id: HouseholdId,
        name: &str,
        kind: EntryKind,
    ) -> RepoResult<Vec<LedgerSource>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SOURCE_SELECT_SQL}
             WHERE household_id = ?1
               AND name = ?2
               AND kind = ?3
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![household_id.to_string(), name, kind.as_str()])?;
        let mut sources = Vec::new();
        while let Some(row) = rows.next()? {
            sources.push(parse_source_row(row)?);
        }
        Ok(sources)
    }

    fn create_entry(&self, entry: &NewLedgerEntry) -> RepoResult<LedgerEntry> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO ledger_entries (
                id,
                household_id,
                user_id,
                entry_date,
                amount_cents,
                kind,
                source_id,
                line_item_id,
                description
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                id.to_string(),
                entry.household_id.to_string(),
                entry.user_id.to_string(),
                entry.entry_date,
                entry.amount_cents,
                entry.kind.as_str(),
                entry.source_id.to_string(),
                entry.line_item_id.map(|value| value.to_string()),
                entry.description.as_deref(),
            ],
        )?;
        self.get_entry(id)?
            .ok_or_else(|| RepoError::not_found("ledger entry", id))
    }

    fn get_entry(&self, id: LedgerEntryId) -> RepoResult<Option<LedgerEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ENTRY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entry_row(self.conn, row)?));
        }
        Ok(None)
    }

    fn update_entry(
        &self,
        id: LedgerEntryId,
        update: &LedgerEntryUpdate,
    ) -> RepoResult<LedgerEntry> {
        let mut entry = self
            .get_entry(id)?
            .ok_or_else(|| RepoError::not_found("ledger entry", id))?;

        if let Some(entry_date) = update.entry_date {
            entry.entry_date = entry_date;
        }
        if let Some(amount_cents) = update.amount_cents {
            entry.amount_cents = amount_cents;
        }
        if let Some(source_id) = update.source_id {
            entry.source_id = source_id;
        }
        if let Some(line_item_id) = update.line_item_id {
            entry.line_item_id = line_item_id;
        }
        if let Some(description) = update.description.as_ref() {
            entry.description = description.clone();
        }

        self.conn.execute(
            "UPDATE ledger_entries
             SET
                entry_date = ?2,
                amount_cents = ?3,
                source_id = ?4,
                line_item_id = ?5,
                description = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                entry.entry_date,
                entry.amount_cents,
                entry.source_id.to_string(),
                entry.line_item_id.map(|value| value.to_string()),
                entry.description.as_deref(),
            ],
        )?;
        Ok(entry)
    }

    fn detach_line_items(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize> {
        if line_item_ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "UPDATE ledger_entries
                 SET line_item_id = NULL,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE line_item_id IN ({});",
                placeholders(line_item_ids.len())
            ),
            params_from_iter(uuid_values(line_item_ids)),
        )?;
        Ok(changed)
    }

    fn delete_entries(&self, ids: &[LedgerEntryId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM ledger_entries WHERE id IN ({});",
                placeholders(ids.len())
            ),
            params_from_iter(uuid_values(ids)),
        )?;
        Ok(changed)
    }

    fn sync_amounts_from_line_items(&self, line_item_ids: &[LineItemId]) -> RepoResult<usize> {
        if line_item_ids.is_empty() {
            return Ok(0);
        }
        let changed = self.conn.execute(
            &format!(
                "UPDATE ledger_entries
                 SET amount_cents = (
                        SELECT li.total_cents
                        FROM line_items li
                        WHERE li.ledger_entry_id = ledger_entries.id
                     ),
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id IN (
                    SELECT ledger_entry_id FROM line_items WHERE id IN ({})
                 );",
                placeholders(line_item_ids.len())
            ),
            params_from_iter(uuid_values(line_item_ids)),
        )?;
        Ok(changed)
    }

    fn count_entries(&self, household_id: HouseholdId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE household_id = ?1;",
            [household_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_kind(value: &str, column: &'static str) -> RepoResult<EntryKind> {
    EntryKind::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid entry kind `{value}` in {column}")))
}

fn parse_source_row(row: &Row<'_>) -> RepoResult<LedgerSource> {
    let id: String = row.get("id")?;
    let household_id: String = row.get("household_id")?;
    let user_id: String = row.get("user_id")?;
    let kind: String = row.get("kind")?;
    Ok(LedgerSource {
        id: parse_uuid(&id, "ledger_sources.id")?,
        household_id: parse_uuid(&household_id, "ledger_sources.household_id")?,
        user_id: parse_uuid(&user_id, "ledger_sources.user_id")?,
        name: row.get("name")?,
        kind: parse_kind(&kind, "ledger_sources.kind")?,
        amount_cents: row.get("amount_cents")?,
        recurring: parse_bool(row.get("recurring")?, "ledger_sources.recurring")?,
    })
}

fn parse_entry_row(conn: &Connection, row: &Row<'_>) -> RepoResult<LedgerEntry> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "ledger_entries.id")?;
    let household_id: String = row.get("household_id")?;
    let user_id: String = row.get("user_id")?;
    let kind: String = row.get("kind")?;
    let source_id: String = row.get("source_id")?;
    Ok(LedgerEntry {
        id,
        household_id: parse_uuid(&household_id, "ledger_entries.household_id")?,
        user_id: parse_uuid(&user_id, "ledger_entries.user_id")?,
        entry_date: row.get("entry_date")?,
        amount_cents: row.get("amount_cents")?,
        kind: parse_kind(&kind, "ledger_entries.kind")?,
        source_id: parse_uuid(&source_id, "ledger_entries.source_id")?,
        line_item_id: parse_optional_uuid(row.get("line_item_id")?, "ledger_entries.line_item_id")?,
        description: row.get("description")?,
        tag_ids: load_tag_ids(conn, "ledger_entry_tags", "ledger_entry_id", id)?,
    })
}
