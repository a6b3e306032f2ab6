//! Purchase reconciliation workflow.
//!
//! # Responsibility
//! - Turn one recorded purchase into consistent trip, ledger, stock and
//!   catalog state.
//! - Apply purchase edits and their opt-in propagation to sibling records.
//!
//! # Invariants
//! - A line item and its ledger entry are written in one `IMMEDIATE`
//!   transaction and reference each other; both exist or neither does.
//! - Stock and catalog writes run in savepoints inside that transaction; their
//!   failure rolls back to the savepoint only.
//! - Scheduler sync, receipt-hint learning, usage-mode sync and propagation run
//!   after commit. Scheduler and hint failures are advisory; sync and
//!   propagation failures surface as `PartiallyApplied`.

use super::error::{ReconcileError, ReconcileResult};
use super::learning_service::LearningService;
use super::ledger_service::LedgerService;
use super::usage_sync::{
    existing_usage_mode, modes_for_rename, sync_usage_mode, SyncOrigin, UsageSyncReport,
};
use crate::config::EngineConfig;
use crate::model::learning::CorrectedFields;
use crate::model::ledger::{EntryKind, LedgerEntry};
use crate::model::schedule::ScheduledTask;
use crate::model::stock::StockItem;
use crate::model::trip::{LineItem, ShoppingEvent, Stop, UsageMode};
use crate::model::{
    HouseholdId, LineItemId, StockItemId, StockSheetId, StopId, StoreId, TagId, TripId, UserId,
};
use crate::repo::catalog_repo::SqliteCatalogRepository;
use crate::repo::correction_repo::SqliteCorrectionRepository;
use crate::repo::ledger_repo::{
    LedgerEntryUpdate, LedgerRepository, NewLedgerEntry, SqliteLedgerRepository,
};
use crate::repo::schedule_repo::{Scheduler, SqliteScheduleRepository};
use crate::repo::stock_repo::{NewStockItem, SqliteStockRepository, StockRepository};
use crate::repo::tag_repo::{SqliteTagRepository, TagRepository};
use crate::repo::trip_repo::{
    NewTrip, PropagationScope, SharedFieldChange, SqliteTripRepository, TripRepository,
};
use crate::repo::{RepoError, RepoResult};
use chrono::{Local, NaiveDate, NaiveTime};
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::HashSet;
use uuid::Uuid;

/// Where a purchase is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopTarget {
    Existing(StopId),
    New(NewStop),
}

/// Descriptor for a stop created by the purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStop {
    /// Owning trip; same-day consolidation picks or creates one when absent.
    pub trip_id: Option<TripId>,
    pub store: StoreSelector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSelector {
    /// A known store; must exist in the household.
    Id(StoreId),
    /// Store name or code; a freeform stop name when nothing matches.
    NameOrCode(String),
    Freeform(String),
}

/// Stock placement of the purchased goods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StockTarget {
    /// The configured default sheet, when purchases create stock.
    #[default]
    DefaultSheet,
    Sheet(StockSheetId),
    Skip,
}

/// Classifier input captured alongside a purchase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiptHints {
    pub raw_text: Option<String>,
    pub tax_indicator: Option<String>,
    pub tax_rate: Option<f64>,
}

/// One purchase attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPurchase {
    pub household_id: HouseholdId,
    pub user_id: UserId,
    pub stop: StopTarget,
    pub brand: String,
    pub item_name: String,
    pub count: f64,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub taxable: bool,
    /// Caller-local purchase date. Absent falls back to server today, logged.
    pub purchased_on: Option<NaiveDate>,
    pub tag_ids: Vec<TagId>,
    /// Explicit mode triggers a household-wide sync after commit.
    pub usage_mode: Option<UsageMode>,
    pub stock: StockTarget,
    pub hints: Option<ReceiptHints>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOutcome {
    pub trip: ShoppingEvent,
    pub stop: Stop,
    pub line_item: LineItem,
    pub ledger_entry: LedgerEntry,
    pub stock_item: Option<StockItem>,
    pub catalog_updated: bool,
    pub scheduled_task: Option<ScheduledTask>,
    pub hints_learned: bool,
    pub usage_sync: Option<UsageSyncReport>,
}

impl PurchaseOutcome {
    pub fn scheduler_synced(&self) -> bool {
        self.scheduled_task.is_some()
    }
}

/// Partial edit of a purchase. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseEdit {
    pub brand: Option<String>,
    pub item_name: Option<String>,
    pub count: Option<f64>,
    pub quantity: Option<Option<f64>>,
    pub unit: Option<Option<String>>,
    pub unit_price_cents: Option<i64>,
    pub taxable: Option<bool>,
    pub usage_mode: Option<UsageMode>,
    pub purchased_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseUpdate {
    pub line_item: LineItem,
    pub ledger_entry: LedgerEntry,
    /// Distinct sibling line items rewritten by propagation.
    pub propagated_line_items: usize,
    /// Distinct stock items rewritten by propagation.
    pub propagated_stock_items: usize,
    pub usage_sync: Option<UsageSyncReport>,
}

struct PrimaryWrite {
    trip: ShoppingEvent,
    stop: Stop,
    store_name: String,
    line_item: LineItem,
    ledger_entry: LedgerEntry,
}

#[derive(Default)]
struct PropagationCounts {
    line_items: usize,
    stock_items: usize,
    /// Rows whose usage mode followed a brand rename into an existing pair.
    usage_sync: Option<UsageSyncReport>,
}

pub struct PurchaseService<'conn, S: Scheduler> {
    conn: &'conn Connection,
    scheduler: S,
    config: EngineConfig,
}

impl<'conn> PurchaseService<'conn, SqliteScheduleRepository<'conn>> {
    /// Uses the SQLite scheduler on the same connection, titled from
    /// `config.scheduler_task_title`.
    pub fn with_sqlite_scheduler(conn: &'conn Connection, config: &EngineConfig) -> Self {
        let scheduler =
            SqliteScheduleRepository::new(conn).with_task_title(config.scheduler_task_title.trim());
        Self::new(conn, scheduler, config)
    }
}

impl<'conn, S: Scheduler> PurchaseService<'conn, S> {
    /// The scheduler keeps its own task title; `config.scheduler_task_title`
    /// only applies through `with_sqlite_scheduler`.
    pub fn new(conn: &'conn Connection, scheduler: S, config: &EngineConfig) -> Self {
        Self {
            conn,
            scheduler,
            config: config.clone(),
        }
    }

    /// Records one purchase across trip, ledger, stock and catalog.
    ///
    /// # Errors
    /// - `Validation` for blank names, non-positive count, missing or negative
    ///   pricing and unknown tags; nothing is written.
    /// - `NotFound` for unknown stop, trip or store references.
    /// - `Transaction` when the primary unit of work fails and rolls back.
    /// - `PartiallyApplied` when the purchase committed but the usage-mode
    ///   sync requested by an explicit mode failed.
    pub fn record_purchase(&self, input: &RecordPurchase) -> ReconcileResult<PurchaseOutcome> {
        let result = self.record_purchase_inner(input);
        match &result {
            Ok(outcome) => info!(
                "event=purchase_record module=purchase status=ok household_id={} trip_id={} stop_id={} line_item_id={} ledger_entry_id={} stock_item={} catalog_updated={} scheduler_synced={}",
                input.household_id,
                outcome.trip.id,
                outcome.stop.id,
                outcome.line_item.id,
                outcome.ledger_entry.id,
                outcome.stock_item.is_some(),
                outcome.catalog_updated,
                outcome.scheduler_synced()
            ),
            Err(err) => error!(
                "event=purchase_record module=purchase status=error household_id={} error_code={} error={}",
                input.household_id,
                err.code(),
                err
            ),
        }
        result
    }

    /// Applies an edit to one purchase, then optionally propagates shared
    /// field changes to siblings at the same store with the same brand.
    ///
    /// A rename into a (brand, item) pair that already exists adopts that
    /// pair's usage mode unless the edit sets one; propagated brand renames
    /// do the same for siblings and their stock items.
    pub fn update_purchase(
        &self,
        id: LineItemId,
        edit: &PurchaseEdit,
        propagate: bool,
    ) -> ReconcileResult<PurchaseUpdate> {
        let result = self.update_purchase_inner(id, edit, propagate);
        match &result {
            Ok(update) => info!(
                "event=purchase_update module=purchase status=ok line_item_id={} propagate={} propagated_line_items={} propagated_stock_items={}",
                id, propagate, update.propagated_line_items, update.propagated_stock_items
            ),
            Err(err) => error!(
                "event=purchase_update module=purchase status=error line_item_id={} error_code={} error={}",
                id,
                err.code(),
                err
            ),
        }
        result
    }

    fn record_purchase_inner(&self, input: &RecordPurchase) -> ReconcileResult<PurchaseOutcome> {
        let brand = input.brand.trim();
        let item_name = input.item_name.trim();
        if brand.is_empty() {
            return Err(ReconcileError::validation("brand cannot be blank"));
        }
        if item_name.is_empty() {
            return Err(ReconcileError::validation("item name cannot be blank"));
        }
        validate_quantity(input.quantity)?;
        let (unit_price_cents, total_cents) =
            price_line(input.count, input.unit_price_cents, input.total_cents)
                .map_err(ReconcileError::Validation)?;
        let purchased_on = resolve_purchase_date(input.purchased_on, input.household_id);

        let mut tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let primary = write_primary(
            &tx,
            input,
            LineDraft {
                brand,
                item_name,
                unit_price_cents,
                total_cents,
                purchased_on,
            },
        )?;

        let stock_item = match self.stock_sheet_for(input.stock) {
            Some(sheet) => {
                let sp = tx.savepoint()?;
                let created = self.create_purchase_stock(&sp, sheet, &primary);
                match created {
                    Ok(item) => {
                        sp.commit()?;
                        Some(item)
                    }
                    Err(err) => {
                        warn!(
                            "event=purchase_stock module=purchase status=advisory_failure line_item_id={} error={}",
                            primary.line_item.id, err
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let catalog_updated = {
            let sp = tx.savepoint()?;
            let learned = LearningService::new(
                SqliteCatalogRepository::new(&sp),
                SqliteCorrectionRepository::new(&sp),
            )
            .learn_from_purchase(&primary.line_item);
            match learned {
                Ok(_) => {
                    sp.commit()?;
                    true
                }
                Err(err) => {
                    warn!(
                        "event=purchase_catalog module=purchase status=advisory_failure line_item_id={} error={}",
                        primary.line_item.id, err
                    );
                    false
                }
            }
        };

        tx.commit()?;

        let scheduled_task = match self.scheduler.ensure_task_for_trip(
            primary.trip.id,
            input.household_id,
            input.user_id,
            primary.trip.trip_date(),
        ) {
            Ok(task) => Some(task),
            Err(err) => {
                warn!(
                    "event=purchase_scheduler module=purchase status=advisory_failure trip_id={} error={}",
                    primary.trip.id, err
                );
                None
            }
        };

        let hints_learned = match &input.hints {
            Some(hints) => self.learn_receipt_hints(hints, &primary),
            None => false,
        };

        let usage_sync = match input.usage_mode {
            Some(mode) => Some(
                sync_usage_mode(
                    self.conn,
                    input.household_id,
                    &primary.line_item.brand,
                    &primary.line_item.item_name,
                    mode,
                    SyncOrigin::LineItem(primary.line_item.id),
                )
                .map_err(|source| ReconcileError::PartiallyApplied {
                    committed_id: primary.line_item.id,
                    source,
                })?,
            ),
            None => None,
        };

        Ok(PurchaseOutcome {
            trip: primary.trip,
            stop: primary.stop,
            line_item: primary.line_item,
            ledger_entry: primary.ledger_entry,
            stock_item,
            catalog_updated,
            scheduled_task,
            hints_learned,
            usage_sync,
        })
    }

    fn update_purchase_inner(
        &self,
        id: LineItemId,
        edit: &PurchaseEdit,
        propagate: bool,
    ) -> ReconcileResult<PurchaseUpdate> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let trips = SqliteTripRepository::new(&tx);
        let before = trips
            .get_line_item(id)?
            .ok_or_else(|| ReconcileError::not_found("line item", id))?;
        let mut after = apply_edit(&before, edit)?;
        let renamed = after.brand != before.brand || after.item_name != before.item_name;
        if renamed && edit.usage_mode.is_none() {
            if let Some(mode) =
                existing_usage_mode(&tx, after.household_id, &after.brand, &after.item_name)?
            {
                after.usage_mode = mode;
            }
        }
        trips.update_line_item(&after)?;

        let mut entry_update = LedgerEntryUpdate::default();
        if after.total_cents != before.total_cents {
            entry_update.amount_cents = Some(after.total_cents);
        }
        if after.purchased_on != before.purchased_on {
            entry_update.entry_date = Some(after.purchased_on);
        }
        let ledger = LedgerService::new(SqliteLedgerRepository::new(&tx));
        let ledger_entry = if entry_update == LedgerEntryUpdate::default() {
            ledger
                .get_entry(after.ledger_entry_id)?
                .ok_or_else(|| ReconcileError::not_found("ledger entry", after.ledger_entry_id))?
        } else {
            ledger.update_entry(after.ledger_entry_id, &entry_update)?
        };
        let store_name = match after.stop_id {
            Some(stop_id) => trips.stop_store_name(stop_id)?,
            None => None,
        };
        tx.commit()?;

        let usage_sync = if edit.usage_mode.is_some() || after.usage_mode != before.usage_mode {
            Some(
                sync_usage_mode(
                    self.conn,
                    after.household_id,
                    &after.brand,
                    &after.item_name,
                    after.usage_mode,
                    SyncOrigin::LineItem(id),
                )
                .map_err(|source| ReconcileError::PartiallyApplied {
                    committed_id: id,
                    source,
                })?,
            )
        } else {
            None
        };

        let changes = shared_field_changes(&before, &after);
        let mut counts = PropagationCounts::default();
        if propagate && !changes.is_empty() {
            match store_name {
                Some(store_name) => {
                    let scope = PropagationScope {
                        household_id: before.household_id,
                        store_name,
                        brand: before.brand.clone(),
                    };
                    counts = propagate_changes(self.conn, &scope, &changes, id).map_err(
                        |source| ReconcileError::PartiallyApplied {
                            committed_id: id,
                            source,
                        },
                    )?;
                }
                None => info!(
                    "event=propagation module=purchase status=skipped line_item_id={} reason=no_store",
                    id
                ),
            }
        }

        let usage_sync = match (usage_sync, counts.usage_sync) {
            (Some(mut own), Some(renamed)) => {
                own.absorb(renamed);
                Some(own)
            }
            (own, renamed) => own.or(renamed),
        };

        Ok(PurchaseUpdate {
            line_item: after,
            ledger_entry,
            propagated_line_items: counts.line_items,
            propagated_stock_items: counts.stock_items,
            usage_sync,
        })
    }

    fn stock_sheet_for(&self, target: StockTarget) -> Option<Option<StockSheetId>> {
        match target {
            StockTarget::Skip => None,
            StockTarget::Sheet(id) => Some(Some(id)),
            StockTarget::DefaultSheet if self.config.stock_from_purchases => Some(None),
            StockTarget::DefaultSheet => None,
        }
    }

    fn create_purchase_stock(
        &self,
        conn: &Connection,
        sheet: Option<StockSheetId>,
        primary: &PrimaryWrite,
    ) -> RepoResult<StockItem> {
        let stock = SqliteStockRepository::new(conn);
        let item = &primary.line_item;
        let sheet_id = match sheet {
            Some(id) => id,
            None => {
                stock
                    .get_or_create_sheet(item.household_id, &self.config.default_stock_sheet)?
                    .id
            }
        };
        stock.create_item(&NewStockItem {
            sheet_id,
            household_id: item.household_id,
            name: item.item_name.clone(),
            brand: item.brand.clone(),
            count: item.count,
            quantity: item.quantity,
            unit: item.unit.clone(),
            unit_price_cents: Some(item.unit_price_cents),
            usage_mode: item.usage_mode,
            trip_id: Some(primary.trip.id),
            stop_id: Some(primary.stop.id),
            purchase_id: Some(item.id),
        })
    }

    fn learn_receipt_hints(&self, hints: &ReceiptHints, primary: &PrimaryWrite) -> bool {
        let learning = LearningService::new(
            SqliteCatalogRepository::new(self.conn),
            SqliteCorrectionRepository::new(self.conn),
        );
        let item = &primary.line_item;
        let mut learned = true;

        if let Some(raw_text) = hints.raw_text.as_deref() {
            let fields = CorrectedFields {
                brand: Some(item.brand.clone()),
                item_name: Some(item.item_name.clone()),
                unit: item.unit.clone(),
                quantity: item.quantity,
                unit_price_cents: Some(item.unit_price_cents),
            };
            if let Err(err) = learning.record_correction(item.household_id, raw_text, &fields) {
                warn!(
                    "event=purchase_hints module=purchase status=advisory_failure kind=correction line_item_id={} error_code={}",
                    item.id,
                    err.code()
                );
                learned = false;
            }
        }
        if let Some(indicator) = hints.tax_indicator.as_deref() {
            if let Err(err) = learning.record_tax_meaning(
                item.household_id,
                &primary.store_name,
                indicator,
                item.taxable,
                hints.tax_rate,
            ) {
                warn!(
                    "event=purchase_hints module=purchase status=advisory_failure kind=tax_rule line_item_id={} error_code={}",
                    item.id,
                    err.code()
                );
                learned = false;
            }
        }
        learned
    }
}

/// Validated line values shared by the primary write.
struct LineDraft<'a> {
    brand: &'a str,
    item_name: &'a str,
    unit_price_cents: i64,
    total_cents: i64,
    purchased_on: NaiveDate,
}

fn write_primary(
    conn: &Connection,
    input: &RecordPurchase,
    draft: LineDraft<'_>,
) -> ReconcileResult<PrimaryWrite> {
    let trips = SqliteTripRepository::new(conn);
    let tags = SqliteTagRepository::new(conn);

    let tag_ids: Vec<TagId> = tags
        .resolve_tags(input.household_id, &input.tag_ids)
        .map_err(|err| match err {
            RepoError::NotFound { entity: "tag", id } => {
                ReconcileError::validation(format!("unknown tag {id}"))
            }
            other => other.into(),
        })?
        .into_iter()
        .map(|tag| tag.id)
        .collect();

    let (trip, stop) = resolve_stop(
        &trips,
        input.household_id,
        &input.stop,
        draft.purchased_on,
    )?;
    let store_name = trips
        .stop_store_name(stop.id)?
        .ok_or_else(|| ReconcileError::not_found("stop", stop.id))?;

    let ledger = LedgerService::new(SqliteLedgerRepository::new(conn));
    let source =
        ledger.get_or_create_source_for_store(input.household_id, input.user_id, &store_name)?;

    let usage_mode = match input.usage_mode {
        Some(mode) => mode,
        None => existing_usage_mode(conn, input.household_id, draft.brand, draft.item_name)?
            .unwrap_or_default(),
    };

    let entry = ledger.create_entry(&NewLedgerEntry {
        household_id: input.household_id,
        user_id: input.user_id,
        entry_date: draft.purchased_on,
        amount_cents: draft.total_cents,
        kind: EntryKind::Expense,
        source_id: source.id,
        line_item_id: None,
        description: Some(format!("{} {}", draft.brand, draft.item_name)),
    })?;

    let line_item = LineItem {
        id: Uuid::new_v4(),
        household_id: input.household_id,
        user_id: input.user_id,
        stop_id: Some(stop.id),
        ledger_entry_id: entry.id,
        brand: draft.brand.to_string(),
        item_name: draft.item_name.to_string(),
        count: input.count,
        quantity: input.quantity,
        unit: normalize_unit(input.unit.as_deref()),
        unit_price_cents: draft.unit_price_cents,
        total_cents: draft.total_cents,
        taxable: input.taxable,
        usage_mode,
        purchased_on: draft.purchased_on,
        tag_ids: tag_ids.clone(),
    };
    trips.insert_line_item(&line_item)?;
    tags.attach_to_line_item(line_item.id, &tag_ids)?;
    tags.attach_to_ledger_entry(entry.id, &tag_ids)?;

    let ledger_entry = ledger.update_entry(
        entry.id,
        &LedgerEntryUpdate {
            line_item_id: Some(Some(line_item.id)),
            ..LedgerEntryUpdate::default()
        },
    )?;

    Ok(PrimaryWrite {
        trip,
        stop,
        store_name,
        line_item,
        ledger_entry,
    })
}

fn resolve_stop(
    trips: &SqliteTripRepository<'_>,
    household_id: HouseholdId,
    target: &StopTarget,
    purchased_on: NaiveDate,
) -> ReconcileResult<(ShoppingEvent, Stop)> {
    let new_stop = match target {
        StopTarget::Existing(stop_id) => {
            let stop = trips
                .get_stop(*stop_id)?
                .ok_or_else(|| ReconcileError::not_found("stop", *stop_id))?;
            let trip = trips
                .get_trip(stop.trip_id)?
                .filter(|trip| trip.household_id == household_id)
                .ok_or_else(|| ReconcileError::not_found("stop", *stop_id))?;
            return Ok((trip, stop));
        }
        StopTarget::New(new_stop) => new_stop,
    };

    let trip = match new_stop.trip_id {
        Some(trip_id) => trips
            .get_trip(trip_id)?
            .filter(|trip| trip.household_id == household_id)
            .ok_or_else(|| ReconcileError::not_found("trip", trip_id))?,
        None => match trips.find_trip_on(household_id, purchased_on)? {
            Some(trip) => {
                info!(
                    "event=trip_consolidate module=purchase status=reused trip_id={} household_id={}",
                    trip.id, household_id
                );
                trip
            }
            None => trips.create_trip(&NewTrip {
                household_id,
                driver_id: None,
                started_at: purchased_on.and_time(NaiveTime::MIN),
                ended_at: None,
                notes: None,
            })?,
        },
    };

    let stop = match &new_stop.store {
        StoreSelector::Id(store_id) => {
            let store = trips
                .get_store(*store_id)?
                .filter(|store| store.household_id == household_id)
                .ok_or_else(|| ReconcileError::not_found("store", *store_id))?;
            trips.create_stop(trip.id, Some(store.id), None)?
        }
        StoreSelector::NameOrCode(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(ReconcileError::validation("store name cannot be blank"));
            }
            match trips.find_store(household_id, text)? {
                Some(store) => trips.create_stop(trip.id, Some(store.id), None)?,
                None => trips.create_stop(trip.id, None, Some(text))?,
            }
        }
        StoreSelector::Freeform(name) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(ReconcileError::validation("store name cannot be blank"));
            }
            trips.create_stop(trip.id, None, Some(name))?
        }
    };
    Ok((trip, stop))
}

fn propagate_changes(
    conn: &Connection,
    scope: &PropagationScope,
    changes: &[SharedFieldChange],
    origin: LineItemId,
) -> RepoResult<PropagationCounts> {
    let trips = SqliteTripRepository::new(conn);
    let stock = SqliteStockRepository::new(conn);
    let ledger = SqliteLedgerRepository::new(conn);
    let mut line_items = HashSet::new();
    let mut stock_items = HashSet::new();
    let mut usage_sync: Option<UsageSyncReport> = None;

    for change in changes {
        let line_ids = trips.propagation_targets(scope, change, origin)?;
        let stock_ids = stock.propagation_targets(scope, change)?;
        let adopted_modes = match change {
            SharedFieldChange::Brand { new, .. } => {
                let names = renamed_item_names(&trips, &stock, &line_ids, &stock_ids)?;
                modes_for_rename(conn, scope.household_id, new, &names)?
            }
            _ => Vec::new(),
        };

        trips.apply_shared_field(&line_ids, change)?;
        if matches!(change, SharedFieldChange::UnitPrice { .. }) {
            ledger.sync_amounts_from_line_items(&line_ids)?;
        }
        stock.apply_shared_field(&stock_ids, change)?;

        if let SharedFieldChange::Brand { new, .. } = change {
            for (item_name, mode) in &adopted_modes {
                let report = sync_usage_mode(
                    conn,
                    scope.household_id,
                    new,
                    item_name,
                    *mode,
                    SyncOrigin::LineItem(origin),
                )?;
                usage_sync.get_or_insert_with(UsageSyncReport::default).absorb(report);
            }
        }

        info!(
            "event=propagation module=purchase status=ok line_item_id={} field={} line_items={} stock_items={} adopted_modes={}",
            origin,
            change.column(),
            line_ids.len(),
            stock_ids.len(),
            adopted_modes.len()
        );
        line_items.extend(line_ids);
        stock_items.extend(stock_ids);
    }

    Ok(PropagationCounts {
        line_items: line_items.len(),
        stock_items: stock_items.len(),
        usage_sync,
    })
}

/// Item names carried by rows about to be renamed, line items first.
fn renamed_item_names(
    trips: &SqliteTripRepository<'_>,
    stock: &SqliteStockRepository<'_>,
    line_ids: &[LineItemId],
    stock_ids: &[StockItemId],
) -> RepoResult<Vec<String>> {
    let mut names = Vec::new();
    for id in line_ids {
        if let Some(item) = trips.get_line_item(*id)? {
            names.push(item.item_name);
        }
    }
    for id in stock_ids {
        if let Some(item) = stock.get_item(*id)? {
            names.push(item.name);
        }
    }
    Ok(names)
}

/// Shared-field edits between two versions of a line item. Brand comes last so
/// earlier changes still match siblings by the old brand.
fn shared_field_changes(before: &LineItem, after: &LineItem) -> Vec<SharedFieldChange> {
    let mut changes = Vec::new();
    if before.unit != after.unit {
        changes.push(SharedFieldChange::Unit {
            old: before.unit.clone(),
            new: after.unit.clone(),
        });
    }
    if before.unit_price_cents != after.unit_price_cents {
        changes.push(SharedFieldChange::UnitPrice {
            old: before.unit_price_cents,
            new: after.unit_price_cents,
        });
    }
    if before.brand != after.brand {
        changes.push(SharedFieldChange::Brand {
            old: before.brand.clone(),
            new: after.brand.clone(),
        });
    }
    changes
}

fn apply_edit(before: &LineItem, edit: &PurchaseEdit) -> ReconcileResult<LineItem> {
    let mut after = before.clone();
    if let Some(brand) = &edit.brand {
        let brand = brand.trim();
        if brand.is_empty() {
            return Err(ReconcileError::validation("brand cannot be blank"));
        }
        after.brand = brand.to_string();
    }
    if let Some(item_name) = &edit.item_name {
        let item_name = item_name.trim();
        if item_name.is_empty() {
            return Err(ReconcileError::validation("item name cannot be blank"));
        }
        after.item_name = item_name.to_string();
    }
    if let Some(count) = edit.count {
        validate_count(count).map_err(ReconcileError::Validation)?;
        after.count = count;
    }
    if let Some(quantity) = edit.quantity {
        validate_quantity(quantity)?;
        after.quantity = quantity;
    }
    if let Some(unit) = &edit.unit {
        after.unit = normalize_unit(unit.as_deref());
    }
    if let Some(unit_price_cents) = edit.unit_price_cents {
        if unit_price_cents < 0 {
            return Err(ReconcileError::validation("unit price cannot be negative"));
        }
        after.unit_price_cents = unit_price_cents;
    }
    if let Some(taxable) = edit.taxable {
        after.taxable = taxable;
    }
    if let Some(usage_mode) = edit.usage_mode {
        after.usage_mode = usage_mode;
    }
    if let Some(purchased_on) = edit.purchased_on {
        after.purchased_on = purchased_on;
    }
    if after.count != before.count || after.unit_price_cents != before.unit_price_cents {
        after.total_cents = line_total(after.count, after.unit_price_cents);
    }
    Ok(after)
}

fn resolve_purchase_date(purchased_on: Option<NaiveDate>, household_id: HouseholdId) -> NaiveDate {
    match purchased_on {
        Some(date) => date,
        None => {
            let today = Local::now().date_naive();
            warn!(
                "event=purchase_date_fallback module=purchase status=warn household_id={} fallback_date={}",
                household_id, today
            );
            today
        }
    }
}

fn normalize_unit(unit: Option<&str>) -> Option<String> {
    unit.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn validate_count(count: f64) -> Result<(), String> {
    if count.is_finite() && count > 0.0 {
        Ok(())
    } else {
        Err(format!("count must be a positive number, got {count}"))
    }
}

fn validate_quantity(quantity: Option<f64>) -> ReconcileResult<()> {
    match quantity {
        Some(value) if !(value.is_finite() && value >= 0.0) => Err(ReconcileError::validation(
            format!("quantity must be a non-negative number, got {value}"),
        )),
        _ => Ok(()),
    }
}

fn line_total(count: f64, unit_price_cents: i64) -> i64 {
    (count * unit_price_cents as f64).round() as i64
}

/// Resolves `(unit_price_cents, total_cents)` from whichever side is given.
/// A supplied total wins over `count x unit price`.
fn price_line(
    count: f64,
    unit_price_cents: Option<i64>,
    total_cents: Option<i64>,
) -> Result<(i64, i64), String> {
    validate_count(count)?;
    if unit_price_cents.is_some_and(|value| value < 0) || total_cents.is_some_and(|value| value < 0)
    {
        return Err("prices cannot be negative".to_string());
    }
    match (unit_price_cents, total_cents) {
        (Some(unit), Some(total)) => Ok((unit, total)),
        (Some(unit), None) => Ok((unit, line_total(count, unit))),
        (None, Some(total)) => Ok(((total as f64 / count).round() as i64, total)),
        (None, None) => Err("either unit price or line total is required".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_unit, price_line, shared_field_changes};
    use crate::model::trip::{LineItem, UsageMode};
    use crate::repo::trip_repo::SharedFieldChange;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample_item() -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            household_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            stop_id: None,
            ledger_entry_id: Uuid::new_v4(),
            brand: "Acme".to_string(),
            item_name: "Milk".to_string(),
            count: 2.0,
            quantity: Some(64.0),
            unit: Some("oz".to_string()),
            unit_price_cents: 349,
            total_cents: 698,
            taxable: false,
            usage_mode: UsageMode::Count,
            purchased_on: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            tag_ids: Vec::new(),
        }
    }

    #[test]
    fn price_line_derives_total_from_unit_price() {
        assert_eq!(price_line(3.0, Some(199), None).unwrap(), (199, 597));
        assert_eq!(price_line(0.5, Some(333), None).unwrap(), (333, 167));
    }

    #[test]
    fn price_line_derives_unit_price_from_total() {
        assert_eq!(price_line(3.0, None, Some(1000)).unwrap(), (333, 1000));
    }

    #[test]
    fn price_line_keeps_supplied_total() {
        assert_eq!(price_line(2.0, Some(150), Some(250)).unwrap(), (150, 250));
    }

    #[test]
    fn price_line_rejects_bad_input() {
        assert!(price_line(0.0, Some(100), None).is_err());
        assert!(price_line(f64::NAN, Some(100), None).is_err());
        assert!(price_line(1.0, None, None).is_err());
        assert!(price_line(1.0, Some(-1), None).is_err());
    }

    #[test]
    fn normalize_unit_drops_blank_values() {
        assert_eq!(normalize_unit(Some("  ")), None);
        assert_eq!(normalize_unit(Some(" oz ")).as_deref(), Some("oz"));
        assert_eq!(normalize_unit(None), None);
    }

    #[test]
    fn shared_field_changes_orders_brand_last() {
        let before = sample_item();
        let mut after = before.clone();
        after.brand = "Acme Farms".to_string();
        after.unit = Some("g".to_string());
        after.unit_price_cents = 399;

        let changes = shared_field_changes(&before, &after);
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], SharedFieldChange::Unit { .. }));
        assert!(matches!(changes[1], SharedFieldChange::UnitPrice { old: 349, new: 399 }));
        assert!(matches!(changes.last(), Some(SharedFieldChange::Brand { .. })));
    }

    #[test]
    fn shared_field_changes_ignores_private_fields() {
        let before = sample_item();
        let mut after = before.clone();
        after.count = 5.0;
        after.taxable = true;
        assert!(shared_field_changes(&before, &after).is_empty());
    }
}
