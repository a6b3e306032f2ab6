//! Self-learning classifier service: catalog defaults, text corrections and
//! per-store tax meanings.
//!
//! # Invariants
//! - Lookups never invent a fallback; absent means "no opinion".
//! - Raw receipt text is normalized before it is used as a key.
//! - Tax rates lie in `[0, 1]`.

use super::error::{ReconcileError, ReconcileResult};
use crate::model::learning::{CatalogEntry, CorrectedFields, Correction, TaxRule};
use crate::model::trip::LineItem;
use crate::model::HouseholdId;
use crate::repo::catalog_repo::{CatalogDefaults, CatalogRepository};
use crate::repo::correction_repo::{CorrectionRepository, NewTaxRule};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

pub struct LearningService<C: CatalogRepository, K: CorrectionRepository> {
    catalog: C,
    corrections: K,
}

impl<C: CatalogRepository, K: CorrectionRepository> LearningService<C, K> {
    pub fn new(catalog: C, corrections: K) -> Self {
        Self {
            catalog,
            corrections,
        }
    }

    /// Overwrites the brand's catalog defaults with this purchase's values.
    pub fn learn_from_purchase(&self, item: &LineItem) -> ReconcileResult<CatalogEntry> {
        let brand = item.brand.trim();
        if brand.is_empty() {
            return Err(ReconcileError::validation("brand cannot be blank"));
        }
        let entry = self.catalog.upsert_defaults(&CatalogDefaults {
            household_id: item.household_id,
            brand: brand.to_string(),
            default_item: Some(item.item_name.clone()),
            default_unit: item.unit.clone(),
            default_quantity: item.quantity,
            default_tag_ids: item.tag_ids.clone(),
        })?;
        Ok(entry)
    }

    pub fn catalog_defaults(
        &self,
        household_id: HouseholdId,
        brand: &str,
    ) -> ReconcileResult<Option<CatalogEntry>> {
        Ok(self.catalog.find_entry(household_id, brand.trim())?)
    }

    pub fn record_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
        fields: &CorrectedFields,
    ) -> ReconcileResult<Correction> {
        let key = normalize_raw_text(raw_text)
            .ok_or_else(|| ReconcileError::validation("raw text cannot be blank"))?;
        if fields.is_empty() {
            return Err(ReconcileError::validation(
                "correction must set at least one field",
            ));
        }
        let correction = self.corrections.upsert_correction(household_id, &key, fields)?;
        info!(
            "event=correction_record module=learning status=ok correction_id={} household_id={}",
            correction.id, household_id
        );
        Ok(correction)
    }

    pub fn lookup_correction(
        &self,
        household_id: HouseholdId,
        raw_text: &str,
    ) -> ReconcileResult<Option<Correction>> {
        let Some(key) = normalize_raw_text(raw_text) else {
            return Ok(None);
        };
        Ok(self.corrections.find_correction(household_id, &key)?)
    }

    pub fn record_tax_meaning(
        &self,
        household_id: HouseholdId,
        store_name: &str,
        indicator: &str,
        is_taxable: bool,
        rate: Option<f64>,
    ) -> ReconcileResult<TaxRule> {
        let store_name = store_name.trim();
        let indicator = indicator.trim();
        if store_name.is_empty() {
            return Err(ReconcileError::validation("store name cannot be blank"));
        }
        if indicator.is_empty() {
            return Err(ReconcileError::validation("tax indicator cannot be blank"));
        }
        if let Some(rate) = rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ReconcileError::validation(format!(
                    "tax rate must lie in [0, 1], got {rate}"
                )));
            }
        }
        let rule = self.corrections.upsert_tax_rule(&NewTaxRule {
            household_id,
            store_name: store_name.to_string(),
            indicator: indicator.to_string(),
            is_taxable,
            rate,
        })?;
        info!(
            "event=tax_rule_record module=learning status=ok tax_rule_id={} household_id={}",
            rule.id, household_id
        );
        Ok(rule)
    }

    pub fn lookup_tax_meaning(
        &self,
        household_id: HouseholdId,
        store_name: &str,
        indicator: &str,
    ) -> ReconcileResult<Option<TaxRule>> {
        Ok(self
            .corrections
            .find_tax_rule(household_id, store_name.trim(), indicator.trim())?)
    }
}

/// Trims and collapses inner whitespace runs. Returns `None` for blank text.
pub fn normalize_raw_text(raw_text: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(raw_text.trim(), " ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.into_owned())
}
