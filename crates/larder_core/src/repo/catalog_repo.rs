//! Catalog repository: learned per-brand defaults.
//!
//! # Invariants
//! - One entry per (household, brand), brand compared case-insensitively.
//! - Upserts overwrite every default field; nothing is merged.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::learning::CatalogEntry;
use crate::model::{HouseholdId, TagId};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Defaults learned from one purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogDefaults {
    pub household_id: HouseholdId,
    pub brand: String,
    pub default_item: Option<String>,
    pub default_unit: Option<String>,
    pub default_quantity: Option<f64>,
    pub default_tag_ids: Vec<TagId>,
}

pub trait CatalogRepository {
    fn upsert_defaults(&self, defaults: &CatalogDefaults) -> RepoResult<CatalogEntry>;
    fn find_entry(&self, household_id: HouseholdId, brand: &str)
        -> RepoResult<Option<CatalogEntry>>;
}

pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn upsert_defaults(&self, defaults: &CatalogDefaults) -> RepoResult<CatalogEntry> {
        let tags_json = serde_json::to_string(&defaults.default_tag_ids).map_err(|err| {
            RepoError::InvalidData(format!("cannot encode catalog default tags: {err}"))
        })?;
        self.conn.execute(
            "INSERT INTO catalog_entries (
                id,
                household_id,
                name,
                default_item,
                default_unit,
                default_quantity,
                default_tags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (household_id, name) DO UPDATE SET
                default_item = excluded.default_item,
                default_unit = excluded.default_unit,
                default_quantity = excluded.default_quantity,
                default_tags = excluded.default_tags,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                Uuid::new_v4().to_string(),
                defaults.household_id.to_string(),
                defaults.brand.as_str(),
                defaults.default_item.as_deref(),
                defaults.default_unit.as_deref(),
                defaults.default_quantity,
                tags_json,
            ],
        )?;
        self.find_entry(defaults.household_id, &defaults.brand)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "catalog entry `{}` missing after upsert",
                    defaults.brand
                ))
            })
    }

    fn find_entry(
        &self,
        household_id: HouseholdId,
        brand: &str,
    ) -> RepoResult<Option<CatalogEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, default_item, default_unit, default_quantity, default_tags
                 FROM catalog_entries
                 WHERE household_id = ?1
                   AND name = ?2;",
                params![household_id.to_string(), brand],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, default_item, default_unit, default_quantity, tags_json)) = row else {
            return Ok(None);
        };
        let default_tag_ids: Vec<TagId> = serde_json::from_str(&tags_json).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid default tags `{tags_json}` in catalog_entries.default_tags: {err}"
            ))
        })?;
        Ok(Some(CatalogEntry {
            id: parse_uuid(&id, "catalog_entries.id")?,
            household_id,
            name,
            default_item,
            default_unit,
            default_quantity,
            default_tag_ids,
        }))
    }
}
