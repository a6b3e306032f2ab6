//! Household tags attached to line items and ledger entries.

use super::{HouseholdId, TagId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub household_id: HouseholdId,
    pub name: String,
}
