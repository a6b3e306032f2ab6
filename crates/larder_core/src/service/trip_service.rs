//! Trip hierarchy service: explicit creation, reads and the deletion cascade.
//!
//! # Responsibility
//! - Create stores and shopping events outside the purchase workflow.
//! - Delete line items, stops, trips and trip-bound scheduler tasks.
//! - Report household overview counts.
//!
//! # Invariants
//! - Each delete runs as one `IMMEDIATE` transaction per deleted root.
//! - Unlink statements precede delete statements inside that transaction.
//! - Deleting downward never removes a scheduler task; it only nulls the
//!   task's trip reference.

use super::error::{ReconcileError, ReconcileResult};
use crate::model::schedule::ScheduledTask;
use crate::model::trip::{LineItem, ShoppingEvent, Stop, Store};
use crate::model::{HouseholdId, LedgerEntryId, LineItemId, StopId, TaskId, TripId};
use crate::repo::ledger_repo::{LedgerRepository, SqliteLedgerRepository};
use crate::repo::schedule_repo::{ScheduleRepository, SqliteScheduleRepository};
use crate::repo::stock_repo::{SqliteStockRepository, StockRepository};
use crate::repo::trip_repo::{NewStore, NewTrip, SqliteTripRepository, TripRepository};
use crate::repo::RepoResult;
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Rows touched by one delete call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub trips: usize,
    pub stops: usize,
    pub line_items: usize,
    pub ledger_entries: usize,
    pub tasks: usize,
    pub stock_items_unlinked: usize,
    pub tasks_unlinked: usize,
}

impl DeleteReport {
    fn absorb(&mut self, other: DeleteReport) {
        self.trips += other.trips;
        self.stops += other.stops;
        self.line_items += other.line_items;
        self.ledger_entries += other.ledger_entries;
        self.tasks += other.tasks;
        self.stock_items_unlinked += other.stock_items_unlinked;
        self.tasks_unlinked += other.tasks_unlinked;
    }
}

/// Household record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HouseholdOverview {
    pub trips: i64,
    pub stops: i64,
    pub line_items: i64,
    pub ledger_entries: i64,
    pub stock_items: i64,
}

pub struct TripService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TripService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn create_store(&self, store: &NewStore) -> ReconcileResult<Store> {
        let name = store.name.trim();
        if name.is_empty() {
            return Err(ReconcileError::validation("store name cannot be blank"));
        }
        let code = store
            .code
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(SqliteTripRepository::new(self.conn).create_store(&NewStore {
            household_id: store.household_id,
            name: name.to_string(),
            code,
        })?)
    }

    pub fn create_trip(&self, trip: &NewTrip) -> ReconcileResult<ShoppingEvent> {
        if trip.ended_at.is_some_and(|ended_at| ended_at < trip.started_at) {
            return Err(ReconcileError::validation("trip cannot end before it starts"));
        }
        let created = SqliteTripRepository::new(self.conn).create_trip(trip)?;
        info!(
            "event=trip_create module=trip status=ok trip_id={} household_id={}",
            created.id, created.household_id
        );
        Ok(created)
    }

    pub fn get_trip(&self, id: TripId) -> ReconcileResult<Option<ShoppingEvent>> {
        Ok(SqliteTripRepository::new(self.conn).get_trip(id)?)
    }

    pub fn list_trips(&self, household_id: HouseholdId) -> ReconcileResult<Vec<ShoppingEvent>> {
        Ok(SqliteTripRepository::new(self.conn).list_trips(household_id)?)
    }

    pub fn get_stop(&self, id: StopId) -> ReconcileResult<Option<Stop>> {
        Ok(SqliteTripRepository::new(self.conn).get_stop(id)?)
    }

    pub fn list_stops(&self, trip_id: TripId) -> ReconcileResult<Vec<Stop>> {
        Ok(SqliteTripRepository::new(self.conn).list_stops(trip_id)?)
    }

    pub fn get_line_item(&self, id: LineItemId) -> ReconcileResult<Option<LineItem>> {
        Ok(SqliteTripRepository::new(self.conn).get_line_item(id)?)
    }

    pub fn list_line_items(&self, stop_id: StopId) -> ReconcileResult<Vec<LineItem>> {
        Ok(SqliteTripRepository::new(self.conn).list_line_items(stop_id)?)
    }

    pub fn get_task(&self, id: TaskId) -> ReconcileResult<Option<ScheduledTask>> {
        Ok(SqliteScheduleRepository::new(self.conn).get_task(id)?)
    }

    /// Deletes one line item and its ledger entry; stock keeps the item with
    /// `purchase_id` nulled.
    pub fn delete_line_item(&self, id: LineItemId) -> ReconcileResult<DeleteReport> {
        self.in_delete_tx("line_item", id, |conn| {
            let item = SqliteTripRepository::new(conn)
                .get_line_item(id)?
                .ok_or_else(|| ReconcileError::not_found("line item", id))?;
            Ok(delete_line_items(conn, &[(item.id, item.ledger_entry_id)])?)
        })
    }

    /// Deletes one stop with its line items and their ledger entries.
    pub fn delete_stop(&self, id: StopId) -> ReconcileResult<DeleteReport> {
        self.in_delete_tx("stop", id, |conn| {
            if SqliteTripRepository::new(conn).get_stop(id)?.is_none() {
                return Err(ReconcileError::not_found("stop", id));
            }
            Ok(delete_stops(conn, &[id])?)
        })
    }

    /// Deletes a trip subtree. Bound scheduler tasks survive, unlinked.
    pub fn delete_trip(&self, id: TripId) -> ReconcileResult<DeleteReport> {
        self.in_delete_tx("trip", id, |conn| {
            if SqliteTripRepository::new(conn).get_trip(id)?.is_none() {
                return Err(ReconcileError::not_found("trip", id));
            }
            Ok(delete_trip(conn, id)?)
        })
    }

    /// Deletes a scheduler task. A task bound to a trip takes the trip
    /// subtree with it.
    pub fn delete_scheduled_task(&self, id: TaskId) -> ReconcileResult<DeleteReport> {
        self.in_delete_tx("scheduled_task", id, |conn| {
            let schedule = SqliteScheduleRepository::new(conn);
            let task = schedule
                .get_task(id)?
                .ok_or_else(|| ReconcileError::not_found("scheduled task", id))?;
            let mut report = DeleteReport::default();
            if let Some(trip_id) = task.trip_id {
                report.absorb(delete_trip(conn, trip_id)?);
            }
            report.tasks += schedule.delete_task(id)?;
            Ok(report)
        })
    }

    pub fn household_overview(
        &self,
        household_id: HouseholdId,
    ) -> ReconcileResult<HouseholdOverview> {
        let trips = SqliteTripRepository::new(self.conn);
        Ok(HouseholdOverview {
            trips: trips.count_trips(household_id)?,
            stops: trips.count_stops(household_id)?,
            line_items: trips.count_line_items(household_id)?,
            ledger_entries: SqliteLedgerRepository::new(self.conn).count_entries(household_id)?,
            stock_items: SqliteStockRepository::new(self.conn).count_items(household_id)?,
        })
    }

    fn in_delete_tx(
        &self,
        root: &'static str,
        id: Uuid,
        body: impl FnOnce(&Connection) -> ReconcileResult<DeleteReport>,
    ) -> ReconcileResult<DeleteReport> {
        let result: ReconcileResult<DeleteReport> = (|| {
            let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
            let report = body(&tx)?;
            tx.commit()?;
            Ok(report)
        })();

        match &result {
            Ok(report) => info!(
                "event=delete_cascade module=trip status=ok root={} id={} trips={} stops={} line_items={} ledger_entries={} tasks={} stock_unlinked={} tasks_unlinked={}",
                root,
                id,
                report.trips,
                report.stops,
                report.line_items,
                report.ledger_entries,
                report.tasks,
                report.stock_items_unlinked,
                report.tasks_unlinked
            ),
            Err(err) => error!(
                "event=delete_cascade module=trip status=error root={} id={} error_code={} error={}",
                root,
                id,
                err.code(),
                err
            ),
        }
        result
    }
}

/// Unlinks stock and entry back-references, then deletes line items, then
/// their entries. Each unlink only touches rows still linked.
fn delete_line_items(
    conn: &Connection,
    links: &[(LineItemId, LedgerEntryId)],
) -> RepoResult<DeleteReport> {
    let line_item_ids: Vec<LineItemId> = links.iter().map(|(item, _)| *item).collect();
    let entry_ids: Vec<_> = links.iter().map(|(_, entry)| *entry).collect();
    let ledger = SqliteLedgerRepository::new(conn);

    let stock_items_unlinked =
        SqliteStockRepository::new(conn).unlink_purchases(&line_item_ids)?;
    ledger.detach_line_items(&line_item_ids)?;
    let line_items = SqliteTripRepository::new(conn).delete_line_items(&line_item_ids)?;
    let ledger_entries = ledger.delete_entries(&entry_ids)?;

    Ok(DeleteReport {
        line_items,
        ledger_entries,
        stock_items_unlinked,
        ..DeleteReport::default()
    })
}

fn delete_stops(conn: &Connection, stop_ids: &[StopId]) -> RepoResult<DeleteReport> {
    let trips = SqliteTripRepository::new(conn);
    let links: Vec<_> = trips
        .line_item_links(stop_ids)?
        .into_iter()
        .map(|link| (link.line_item_id, link.ledger_entry_id))
        .collect();

    let unlinked_from_stops = SqliteStockRepository::new(conn).unlink_stops(stop_ids)?;
    let mut report = delete_line_items(conn, &links)?;
    report.stops = trips.delete_stops(stop_ids)?;
    report.stock_items_unlinked += unlinked_from_stops;
    Ok(report)
}

fn delete_trip(conn: &Connection, trip_id: TripId) -> RepoResult<DeleteReport> {
    let trips = SqliteTripRepository::new(conn);
    let stop_ids: Vec<StopId> = trips
        .list_stops(trip_id)?
        .into_iter()
        .map(|stop| stop.id)
        .collect();

    let unlinked_from_trip = SqliteStockRepository::new(conn).unlink_trip(trip_id)?;
    let tasks_unlinked = SqliteScheduleRepository::new(conn).unlink_trip(trip_id)?;
    let mut report = delete_stops(conn, &stop_ids)?;
    report.trips = trips.delete_trip(trip_id)?;
    report.tasks_unlinked = tasks_unlinked;
    report.stock_items_unlinked += unlinked_from_trip;
    Ok(report)
}
