//! Correction repository: raw-text corrections and per-store tax rules.
//!
//! # Invariants
//! - Corrections are keyed by (household, raw text) exactly as given; callers
//!   normalize the text first.
//! - Tax rules are keyed by (household, store, indicator) case-insensitively.
//! - Lookups never synthesize defaults.

use super::{bool_to_int, parse_bool, parse_uuid, RepoError, RepoResult};
use crate::model::learning::{CorrectedFields, Correction, TaxRule};
use crate::model::HouseholdId;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Attributes for a learned tax indicator meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTaxRule {
    pub household_id: HouseholdId,
    pub store_name: String,
    pub indicator: String,
    pub is_taxable: bool,
    pub rate: Option<f64>,
}

pub trait CorrectionRepository {
    fn upsert_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
        fields: &CorrectedFields,
    ) -> RepoResult<Correction>;
    fn find_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
    ) -> RepoResult<Option<Correction>>;
    fn upsert_tax_rule(&self, rule: &NewTaxRule) -> RepoResult<TaxRule>;
    fn find_tax_rule(
        &self,
        household_id: HouseholdId,
        store_name: &str,
        indicator: &str,
    ) -> RepoResult<Option<TaxRule>>;
}

pub struct SqliteCorrectionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCorrectionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CorrectionRepository for SqliteCorrectionRepository<'_> {
    fn upsert_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
        fields: &CorrectedFields,
    ) -> RepoResult<Correction> {
        let corrected = serde_json::to_string(fields).map_err(|err| {
            RepoError::InvalidData(format!("cannot encode corrected fields: {err}"))
        })?;
        self.conn.execute(
            "INSERT INTO corrections (id, household_id, raw_text, corrected)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (household_id, raw_text) DO UPDATE SET
                corrected = excluded.corrected,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                Uuid::new_v4().to_string(),
                household_id.to_string(),
                raw_text,
                corrected,
            ],
        )?;
        self.find_correction(household_id, raw_text)?.ok_or_else(|| {
            RepoError::InvalidData(format!("correction `{raw_text}` missing after upsert"))
        })
    }

    fn find_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
    ) -> RepoResult<Option<Correction>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, corrected
                 FROM corrections
                 WHERE household_id = ?1
                   AND raw_text = ?2;",
                params![household_id.to_string(), raw_text],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((id, corrected)) = row else {
            return Ok(None);
        };
        let fields: CorrectedFields = serde_json::from_str(&corrected).map_err(|err| {
            RepoError::InvalidData(format!("invalid corrections.corrected document: {err}"))
        })?;
        Ok(Some(Correction {
            id: parse_uuid(&id, "corrections.id")?,
            household_id,
            raw_text: raw_text.to_string(),
            fields,
        }))
    }

    fn upsert_tax_rule(&self, rule: &NewTaxRule) -> RepoResult<TaxRule> {
        self.conn.execute(
            "INSERT INTO tax_rules (id, household_id, store_name, indicator, is_taxable, rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (household_id, store_name, indicator) DO UPDATE SET
                is_taxable = excluded.is_taxable,
                rate = excluded.rate,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                Uuid::new_v4().to_string(),
                rule.household_id.to_string(),
                rule.store_name.as_str(),
                rule.indicator.as_str(),
                bool_to_int(rule.is_taxable),
                rule.rate,
            ],
        )?;
        self.find_tax_rule(rule.household_id, &rule.store_name, &rule.indicator)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "tax rule `{}`/`{}` missing after upsert",
                    rule.store_name, rule.indicator
                ))
            })
    }

    fn find_tax_rule(
        &self,
        household_id: HouseholdId,
        store_name: &str,
        indicator: &str,
    ) -> RepoResult<Option<TaxRule>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, store_name, indicator, is_taxable, rate
                 FROM tax_rules
                 WHERE household_id = ?1
                   AND store_name = ?2
                   AND indicator = ?3;",
                params![household_id.to_string(), store_name, indicator],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, stored_store, stored_indicator, is_taxable, rate)) = row else {
            return Ok(None);
        };
        Ok(Some(TaxRule {
            id: parse_uuid(&id, "tax_rules.id")?,
            household_id,
            store_name: stored_store,
            indicator: stored_indicator,
            is_taxable: parse_bool(is_taxable, "tax_rules.is_taxable")?,
            rate,
        }))
    }
}
