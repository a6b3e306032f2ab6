//! Ledger records: income/expense sources and entries.

use super::{HouseholdId, LedgerEntryId, LedgerSourceId, LineItemId, TagId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Direction of money flow for sources and entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

/// Named income/expense category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSource {
    pub id: LedgerSourceId,
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub name: String,
    pub kind: EntryKind,
    /// Budgeted amount. Store-derived sources start at zero.
    pub amount_cents: i64,
    pub recurring: bool,
}

/// One income/expense record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub entry_date: NaiveDate,
    pub amount_cents: i64,
    pub kind: EntryKind,
    pub source_id: LedgerSourceId,
    /// Set when the entry was produced by a purchase.
    pub line_item_id: Option<LineItemId>,
    pub description: Option<String>,
    pub tag_ids: Vec<TagId>,
}
