//! Scheduler contract and SQLite-backed calendar tasks.
//!
//! # Invariants
//! - At most one task is created per trip by `ensure_task_for_trip`.
//! - Unlinking a trip nulls `trip_id`; the task itself survives.

use super::{parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use crate::model::schedule::ScheduledTask;
use crate::model::{HouseholdId, TaskId, TripId, UserId};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    household_id,
    user_id,
    title,
    due_on,
    trip_id
FROM scheduled_tasks";

pub const DEFAULT_TASK_TITLE: &str = "Shopping trip";

/// Failure reported by a scheduler implementation.
#[derive(Debug)]
pub enum SchedulerError {
    Repo(RepoError),
    /// The scheduler refused the request (external calendars, quotas, ...).
    Rejected(String),
}

impl Display for SchedulerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Rejected(reason) => write!(f, "scheduler rejected request: {reason}"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Rejected(_) => None,
        }
    }
}

impl From<RepoError> for SchedulerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for SchedulerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// Calendar integration used after a purchase commits.
pub trait Scheduler {
    /// Returns the task bound to `trip_id`, creating it when absent.
    fn ensure_task_for_trip(
        &self,
        trip_id: TripId,
        household_id: HouseholdId,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<ScheduledTask, SchedulerError>;
}

/// Attributes for a new calendar task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub title: String,
    pub due_on: NaiveDate,
    pub trip_id: Option<TripId>,
}

pub trait ScheduleRepository {
    fn create_task(&self, task: &NewTask) -> RepoResult<ScheduledTask>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<ScheduledTask>>;
    fn task_for_trip(&self, trip_id: TripId) -> RepoResult<Option<ScheduledTask>>;
    /// Nulls `trip_id` on every task bound to the trip.
    fn unlink_trip(&self, trip_id: TripId) -> RepoResult<usize>;
    fn delete_task(&self, id: TaskId) -> RepoResult<usize>;
}

pub struct SqliteScheduleRepository<'conn> {
    conn: &'conn Connection,
    task_title: String,
}

impl<'conn> SqliteScheduleRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            task_title: DEFAULT_TASK_TITLE.to_string(),
        }
    }

    /// Overrides the title used for tasks created by `ensure_task_for_trip`.
    pub fn with_task_title(mut self, title: impl Into<String>) -> Self {
        self.task_title = title.into();
        self
    }

    fn first_task(&self, sql: &str, key: String) -> RepoResult<Option<ScheduledTask>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }
}

impl ScheduleRepository for SqliteScheduleRepository<'_> {
    fn create_task(&self, task: &NewTask) -> RepoResult<ScheduledTask> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO scheduled_tasks (id, household_id, user_id, title, due_on, trip_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                task.household_id.to_string(),
                task.user_id.to_string(),
                task.title.as_str(),
                task.due_on,
                task.trip_id.map(|value| value.to_string()),
            ],
        )?;
        Ok(ScheduledTask {
            id,
            household_id: task.household_id,
            user_id: task.user_id,
            title: task.title.clone(),
            due_on: task.due_on,
            trip_id: task.trip_id,
        })
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<ScheduledTask>> {
        self.first_task(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"), id.to_string())
    }

    fn task_for_trip(&self, trip_id: TripId) -> RepoResult<Option<ScheduledTask>> {
        self.first_task(
            &format!("{TASK_SELECT_SQL} WHERE trip_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1;"),
            trip_id.to_string(),
        )
    }

    fn unlink_trip(&self, trip_id: TripId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE scheduled_tasks SET trip_id = NULL WHERE trip_id = ?1;",
            [trip_id.to_string()],
        )?;
        Ok(changed)
    }

    fn delete_task(&self, id: TaskId) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM scheduled_tasks WHERE id = ?1;", [id.to_string()])?;
        Ok(changed)
    }
}

impl Scheduler for SqliteScheduleRepository<'_> {
    fn ensure_task_for_trip(
        &self,
        trip_id: TripId,
        household_id: HouseholdId,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<ScheduledTask, SchedulerError> {
        if let Some(task) = self.task_for_trip(trip_id)? {
            return Ok(task);
        }
        let task = self.create_task(&NewTask {
            household_id,
            user_id,
            title: self.task_title.clone(),
            due_on: date,
            trip_id: Some(trip_id),
        })?;
        Ok(task)
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<ScheduledTask> {
    let id: String = row.get("id")?;
    let household_id: String = row.get("household_id")?;
    let user_id: String = row.get("user_id")?;
    Ok(ScheduledTask {
        id: parse_uuid(&id, "scheduled_tasks.id")?,
        household_id: parse_uuid(&household_id, "scheduled_tasks.household_id")?,
        user_id: parse_uuid(&user_id, "scheduled_tasks.user_id")?,
        title: row.get("title")?,
        due_on: row.get("due_on")?,
        trip_id: parse_optional_uuid(row.get("trip_id")?, "scheduled_tasks.trip_id")?,
    })
}
