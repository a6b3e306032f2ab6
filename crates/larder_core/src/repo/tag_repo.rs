//! Tag repository: lookup and attachment of household tags.
//!
//! # Invariants
//! - Tag names are unique per household, case-insensitively.
//! - Resolution fails on the first unknown id so callers can abort before any
//!   purchase write.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::tag::Tag;
use crate::model::{HouseholdId, LedgerEntryId, LineItemId, TagId};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub trait TagRepository {
    /// Creates a tag, or returns the existing one with the same name.
    fn create_tag(&self, household_id: HouseholdId, name: &str) -> RepoResult<Tag>;
    /// Loads every requested tag in input order, deduplicated.
    fn resolve_tags(&self, household_id: HouseholdId, tag_ids: &[TagId]) -> RepoResult<Vec<Tag>>;
    fn attach_to_line_item(&self, line_item_id: LineItemId, tag_ids: &[TagId]) -> RepoResult<()>;
    fn attach_to_ledger_entry(
        &self,
        ledger_entry_id: LedgerEntryId,
        tag_ids: &[TagId],
    ) -> RepoResult<()>;
}

pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get_tag(&self, household_id: HouseholdId, tag_id: TagId) -> RepoResult<Option<Tag>> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM tags WHERE id = ?1 AND household_id = ?2;",
                params![tag_id.to_string(), household_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.map(|name| Tag {
            id: tag_id,
            household_id,
            name,
        }))
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn create_tag(&self, household_id: HouseholdId, name: &str) -> RepoResult<Tag> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tags (id, household_id, name) VALUES (?1, ?2, ?3);",
            params![Uuid::new_v4().to_string(), household_id.to_string(), name],
        )?;
        let (id_text, stored_name): (String, String) = self.conn.query_row(
            "SELECT id, name FROM tags WHERE household_id = ?1 AND name = ?2;",
            params![household_id.to_string(), name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(Tag {
            id: parse_uuid(&id_text, "tags.id")?,
            household_id,
            name: stored_name,
        })
    }

    fn resolve_tags(&self, household_id: HouseholdId, tag_ids: &[TagId]) -> RepoResult<Vec<Tag>> {
        let mut tags: Vec<Tag> = Vec::with_capacity(tag_ids.len());
        for tag_id in tag_ids {
            if tags.iter().any(|tag| tag.id == *tag_id) {
                continue;
            }
            let tag = self
                .get_tag(household_id, *tag_id)?
                .ok_or_else(|| RepoError::not_found("tag", *tag_id))?;
            tags.push(tag);
        }
        Ok(tags)
    }

    fn attach_to_line_item(&self, line_item_id: LineItemId, tag_ids: &[TagId]) -> RepoResult<()> {
        for tag_id in tag_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO line_item_tags (line_item_id, tag_id) VALUES (?1, ?2);",
                params![line_item_id.to_string(), tag_id.to_string()],
            )?;
        }
        Ok(())
    }

    fn attach_to_ledger_entry(
        &self,
        ledger_entry_id: LedgerEntryId,
        tag_ids: &[TagId],
    ) -> RepoResult<()> {
        for tag_id in tag_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO ledger_entry_tags (ledger_entry_id, tag_id) VALUES (?1, ?2);",
                params![ledger_entry_id.to_string(), tag_id.to_string()],
            )?;
        }
        Ok(())
    }
}

/// Loads tag ids linked to one owner row through a join table.
pub(crate) fn load_tag_ids(
    conn: &Connection,
    join_table: &'static str,
    owner_column: &'static str,
    owner_id: Uuid,
) -> RepoResult<Vec<TagId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT j.tag_id
         FROM {join_table} j
         INNER JOIN tags t ON t.id = j.tag_id
         WHERE j.{owner_column} = ?1
         ORDER BY t.name COLLATE NOCASE ASC;"
    ))?;
    let mut rows = stmt.query([owner_id.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "tags.id")?);
    }
    Ok(ids)
}
