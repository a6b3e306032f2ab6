//! Ledger use-case service.
//!
//! # Responsibility
//! - Validate source/entry attributes before they reach storage.
//! - Resolve the per-store expense source used by purchases.
//!
//! # Invariants
//! - Store sources are matched by exact, case-sensitive name with
//!   `kind=expense`.
//! - Duplicate store sources are tolerated: the oldest wins and the duplicate
//!   is logged.

use super::error::{ReconcileError, ReconcileResult};
use crate::model::ledger::{EntryKind, LedgerEntry, LedgerSource};
use crate::model::{HouseholdId, LedgerEntryId, LedgerSourceId, UserId};
use crate::repo::ledger_repo::{
    LedgerEntryUpdate, LedgerRepository, NewLedgerEntry, NewLedgerSource,
};
use log::{info, warn};

/// Ledger service facade over a repository implementation.
pub struct LedgerService<R: LedgerRepository> {
    repo: R,
}

impl<R: LedgerRepository> LedgerService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one named source.
    pub fn create_source(&self, source: &NewLedgerSource) -> ReconcileResult<LedgerSource> {
        if source.name.trim().is_empty() {
            return Err(ReconcileError::validation("source name cannot be blank"));
        }
        if source.amount_cents < 0 {
            return Err(ReconcileError::validation("source amount cannot be negative"));
        }
        Ok(self.repo.create_source(source)?)
    }

    /// Returns the expense source named after `store_name`, creating it when
    /// none exists.
    pub fn get_or_create_source_for_store(
        &self,
        household_id: HouseholdId,
        user_id: UserId,
        store_name: &str,
    ) -> ReconcileResult<LedgerSource> {
        if store_name.trim().is_empty() {
            return Err(ReconcileError::validation("store name cannot be blank"));
        }

        let mut existing = self
            .repo
            .find_sources(household_id, store_name, EntryKind::Expense)?;
        if existing.len() > 1 {
            warn!(
                "event=ledger_source_duplicate module=ledger status=advisory household_id={} duplicates={}",
                household_id,
                existing.len()
            );
        }
        if !existing.is_empty() {
            return Ok(existing.swap_remove(0));
        }

        let source = self.repo.create_source(&NewLedgerSource {
            household_id,
            user_id,
            name: store_name.to_string(),
            kind: EntryKind::Expense,
            amount_cents: 0,
            recurring: false,
        })?;
        info!(
            "event=ledger_source_create module=ledger status=ok source_id={} household_id={}",
            source.id, household_id
        );
        Ok(source)
    }

    pub fn create_entry(&self, entry: &NewLedgerEntry) -> ReconcileResult<LedgerEntry> {
        if entry.amount_cents < 0 {
            return Err(ReconcileError::validation("entry amount cannot be negative"));
        }
        let source = self
            .repo
            .get_source(entry.source_id)?
            .ok_or_else(|| ReconcileError::not_found("ledger source", entry.source_id))?;
        if source.household_id != entry.household_id {
            return Err(ReconcileError::not_found("ledger source", entry.source_id));
        }
        Ok(self.repo.create_entry(entry)?)
    }

    pub fn update_entry(
        &self,
        id: LedgerEntryId,
        update: &LedgerEntryUpdate,
    ) -> ReconcileResult<LedgerEntry> {
        if update.amount_cents.is_some_and(|amount| amount < 0) {
            return Err(ReconcileError::validation("entry amount cannot be negative"));
        }
        Ok(self.repo.update_entry(id, update)?)
    }

    pub fn get_source(&self, id: LedgerSourceId) -> ReconcileResult<Option<LedgerSource>> {
        Ok(self.repo.get_source(id)?)
    }

    pub fn get_entry(&self, id: LedgerEntryId) -> ReconcileResult<Option<LedgerEntry>> {
        Ok(self.repo.get_entry(id)?)
    }
}
