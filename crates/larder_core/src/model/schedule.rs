//! Calendar tasks owned by the external scheduler.

use super::{HouseholdId, TaskId, TripId, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar task, optionally bound to a shopping event.
///
/// Deleting the bound trip nulls `trip_id`; deleting the task removes the trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub title: String,
    pub due_on: NaiveDate,
    pub trip_id: Option<TripId>,
}
