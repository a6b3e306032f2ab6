use chrono::{Local, NaiveDate};
use larder_core::db::open_db_in_memory;
use larder_core::model::schedule::ScheduledTask;
use larder_core::model::trip::UsageMode;
use larder_core::repo::ledger_repo::{LedgerRepository, SqliteLedgerRepository};
use larder_core::repo::stock_repo::{SqliteStockRepository, StockRepository};
use larder_core::repo::tag_repo::{SqliteTagRepository, TagRepository};
use larder_core::repo::trip_repo::NewStore;
use larder_core::{
    EngineConfig, LearningService, LedgerService, NewStop, PurchaseService, ReceiptHints,
    ReconcileError, RecordPurchase, Scheduler, SchedulerError, SqliteScheduleRepository,
    StockTarget, StopTarget, StoreSelector, TripService,
};
use larder_core::repo::catalog_repo::SqliteCatalogRepository;
use larder_core::repo::correction_repo::SqliteCorrectionRepository;
use rusqlite::Connection;
use uuid::Uuid;

fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

fn purchase(household_id: Uuid, store: &str, brand: &str, item: &str) -> RecordPurchase {
    RecordPurchase {
        household_id,
        user_id: Uuid::new_v4(),
        stop: StopTarget::New(NewStop {
            trip_id: None,
            store: StoreSelector::Freeform(store.to_string()),
        }),
        brand: brand.to_string(),
        item_name: item.to_string(),
        count: 1.0,
        quantity: None,
        unit: None,
        unit_price_cents: Some(299),
        total_cents: None,
        taxable: false,
        purchased_on: Some(day("2024-03-05")),
        tag_ids: Vec::new(),
        usage_mode: None,
        stock: StockTarget::DefaultSheet,
        hints: None,
    }
}

fn service(conn: &Connection) -> PurchaseService<'_, SqliteScheduleRepository<'_>> {
    PurchaseService::new(
        conn,
        SqliteScheduleRepository::new(conn),
        &EngineConfig::default(),
    )
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

struct RejectingScheduler;

impl Scheduler for RejectingScheduler {
    fn ensure_task_for_trip(
        &self,
        _trip_id: Uuid,
        _household_id: Uuid,
        _user_id: Uuid,
        _date: NaiveDate,
    ) -> Result<ScheduledTask, SchedulerError> {
        Err(SchedulerError::Rejected("calendar offline".to_string()))
    }
}

#[test]
fn record_purchase_links_line_item_and_ledger_entry() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();

    let outcome = service(&conn)
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();

    assert_eq!(count_rows(&conn, "line_items"), 1);
    assert_eq!(count_rows(&conn, "ledger_entries"), 1);
    assert_eq!(outcome.line_item.ledger_entry_id, outcome.ledger_entry.id);
    assert_eq!(outcome.ledger_entry.line_item_id, Some(outcome.line_item.id));

    let stored = SqliteLedgerRepository::new(&conn)
        .get_entry(outcome.ledger_entry.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.line_item_id, Some(outcome.line_item.id));
    assert_eq!(stored.amount_cents, 299);
    assert_eq!(stored.entry_date, day("2024-03-05"));

    let source = SqliteLedgerRepository::new(&conn)
        .get_source(stored.source_id)
        .unwrap()
        .unwrap();
    assert_eq!(source.name, "Mart");
    assert_eq!(source.amount_cents, 0);
}

#[test]
fn record_purchase_reports_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();

    let outcome = service(&conn)
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();

    let stock_item = outcome.stock_item.as_ref().unwrap();
    assert_eq!(stock_item.purchase_id, Some(outcome.line_item.id));
    assert_eq!(stock_item.stop_id, Some(outcome.stop.id));
    assert_eq!(stock_item.trip_id, Some(outcome.trip.id));
    let sheet = SqliteStockRepository::new(&conn)
        .get_sheet(stock_item.sheet_id)
        .unwrap()
        .unwrap();
    assert_eq!(sheet.name, "Pantry");

    assert!(outcome.catalog_updated);
    assert!(outcome.scheduler_synced());
    let task = outcome.scheduled_task.unwrap();
    assert_eq!(task.trip_id, Some(outcome.trip.id));
    assert_eq!(task.due_on, day("2024-03-05"));
    assert_eq!(task.title, "Shopping trip");
}

#[test]
fn same_day_purchases_share_one_trip_and_task() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let first = purchases
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();
    let second = purchases
        .record_purchase(&purchase(household, "Corner", "Acme", "Bread"))
        .unwrap();

    assert_eq!(first.trip.id, second.trip.id);
    assert_ne!(first.stop.id, second.stop.id);
    assert_eq!(second.stop.position, 1);
    assert_eq!(
        first.scheduled_task.unwrap().id,
        second.scheduled_task.unwrap().id
    );

    let overview = TripService::new(&conn).household_overview(household).unwrap();
    assert_eq!(overview.trips, 1);
    assert_eq!(overview.stops, 2);

    let mut later = purchase(household, "Mart", "Acme", "Eggs");
    later.purchased_on = Some(day("2024-03-06"));
    let third = purchases.record_purchase(&later).unwrap();
    assert_ne!(third.trip.id, first.trip.id);
    assert_eq!(
        TripService::new(&conn).household_overview(household).unwrap().trips,
        2
    );
}

#[test]
fn consolidation_is_scoped_to_household() {
    let conn = open_db_in_memory().unwrap();
    let purchases = service(&conn);

    let first = purchases
        .record_purchase(&purchase(Uuid::new_v4(), "Mart", "Acme", "Milk"))
        .unwrap();
    let second = purchases
        .record_purchase(&purchase(Uuid::new_v4(), "Mart", "Acme", "Milk"))
        .unwrap();

    assert_ne!(first.trip.id, second.trip.id);
}

#[test]
fn existing_stop_and_explicit_trip_are_reused() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let first = purchases
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();

    let mut again = purchase(household, "ignored", "Acme", "Butter");
    again.stop = StopTarget::Existing(first.stop.id);
    let second = purchases.record_purchase(&again).unwrap();
    assert_eq!(second.stop.id, first.stop.id);

    let mut other_day = purchase(household, "Corner", "Acme", "Jam");
    other_day.purchased_on = Some(day("2024-04-01"));
    other_day.stop = StopTarget::New(NewStop {
        trip_id: Some(first.trip.id),
        store: StoreSelector::Freeform("Corner".to_string()),
    });
    let third = purchases.record_purchase(&other_day).unwrap();
    assert_eq!(third.trip.id, first.trip.id);

    let items = TripService::new(&conn).list_line_items(first.stop.id).unwrap();
    assert_eq!(items.len(), 2);
    let stops = TripService::new(&conn).list_stops(first.trip.id).unwrap();
    assert_eq!(stops.len(), 2);
}

#[test]
fn unknown_references_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let mut missing_stop = purchase(household, "Mart", "Acme", "Milk");
    let stop_id = Uuid::new_v4();
    missing_stop.stop = StopTarget::Existing(stop_id);
    let err = purchases.record_purchase(&missing_stop).unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { entity: "stop", id } if id == stop_id));

    let mut missing_store = purchase(household, "Mart", "Acme", "Milk");
    missing_store.stop = StopTarget::New(NewStop {
        trip_id: None,
        store: StoreSelector::Id(Uuid::new_v4()),
    });
    let err = purchases.record_purchase(&missing_store).unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { entity: "store", .. }));

    assert_eq!(count_rows(&conn, "shopping_events"), 0);
    assert_eq!(count_rows(&conn, "stops"), 0);
}

#[test]
fn store_selector_resolves_known_stores_by_name_or_code() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let store = TripService::new(&conn)
        .create_store(&NewStore {
            household_id: household,
            name: "Mega Mart".to_string(),
            code: Some("MM".to_string()),
        })
        .unwrap();
    let purchases = service(&conn);

    let mut by_code = purchase(household, "", "Acme", "Milk");
    by_code.stop = StopTarget::New(NewStop {
        trip_id: None,
        store: StoreSelector::NameOrCode("mm".to_string()),
    });
    let outcome = purchases.record_purchase(&by_code).unwrap();
    assert_eq!(outcome.stop.store_id, Some(store.id));
    assert_eq!(outcome.stop.store_name, None);

    let source = SqliteLedgerRepository::new(&conn)
        .get_source(outcome.ledger_entry.source_id)
        .unwrap()
        .unwrap();
    assert_eq!(source.name, "Mega Mart");

    let mut unknown = purchase(household, "", "Acme", "Milk");
    unknown.stop = StopTarget::New(NewStop {
        trip_id: None,
        store: StoreSelector::NameOrCode(" Farm Stand ".to_string()),
    });
    let outcome = purchases.record_purchase(&unknown).unwrap();
    assert_eq!(outcome.stop.store_id, None);
    assert_eq!(outcome.stop.store_name.as_deref(), Some("Farm Stand"));
}

#[test]
fn pricing_is_derived_from_either_side() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let mut by_total = purchase(household, "Mart", "Acme", "Apples");
    by_total.count = 3.0;
    by_total.unit_price_cents = None;
    by_total.total_cents = Some(1000);
    let outcome = purchases.record_purchase(&by_total).unwrap();
    assert_eq!(outcome.line_item.unit_price_cents, 333);
    assert_eq!(outcome.line_item.total_cents, 1000);
    assert_eq!(outcome.ledger_entry.amount_cents, 1000);

    let mut by_unit = purchase(household, "Mart", "Acme", "Pears");
    by_unit.count = 2.5;
    by_unit.unit_price_cents = Some(120);
    let outcome = purchases.record_purchase(&by_unit).unwrap();
    assert_eq!(outcome.line_item.total_cents, 300);
}

#[test]
fn validation_failures_write_nothing() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let mut blank_brand = purchase(household, "Mart", "  ", "Milk");
    blank_brand.brand = "  ".to_string();
    let err = purchases.record_purchase(&blank_brand).unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));

    let mut zero_count = purchase(household, "Mart", "Acme", "Milk");
    zero_count.count = 0.0;
    assert!(matches!(
        purchases.record_purchase(&zero_count).unwrap_err(),
        ReconcileError::Validation(_)
    ));

    let mut no_price = purchase(household, "Mart", "Acme", "Milk");
    no_price.unit_price_cents = None;
    assert!(matches!(
        purchases.record_purchase(&no_price).unwrap_err(),
        ReconcileError::Validation(_)
    ));

    let mut unknown_tag = purchase(household, "Mart", "Acme", "Milk");
    unknown_tag.tag_ids = vec![Uuid::new_v4()];
    assert!(matches!(
        purchases.record_purchase(&unknown_tag).unwrap_err(),
        ReconcileError::Validation(message) if message.contains("unknown tag")
    ));

    for table in [
        "shopping_events",
        "stops",
        "line_items",
        "ledger_entries",
        "ledger_sources",
        "stock_items",
        "catalog_entries",
        "scheduled_tasks",
    ] {
        assert_eq!(count_rows(&conn, table), 0, "{table} should be empty");
    }
}

#[test]
fn tags_are_attached_to_line_item_and_entry() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let tags = SqliteTagRepository::new(&conn);
    let dairy = tags.create_tag(household, "dairy").unwrap();
    let weekly = tags.create_tag(household, "weekly").unwrap();

    let mut tagged = purchase(household, "Mart", "Acme", "Milk");
    tagged.tag_ids = vec![dairy.id, weekly.id, dairy.id];
    let outcome = service(&conn).record_purchase(&tagged).unwrap();

    let mut item_tags = outcome.line_item.tag_ids.clone();
    let mut entry_tags = outcome.ledger_entry.tag_ids.clone();
    item_tags.sort();
    entry_tags.sort();
    let mut expected = vec![dairy.id, weekly.id];
    expected.sort();
    assert_eq!(item_tags, expected);
    assert_eq!(entry_tags, expected);

    let stored = TripService::new(&conn)
        .get_line_item(outcome.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.tag_ids.len(), 2);
}

#[test]
fn tags_from_other_households_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let foreign = SqliteTagRepository::new(&conn)
        .create_tag(Uuid::new_v4(), "dairy")
        .unwrap();

    let mut tagged = purchase(Uuid::new_v4(), "Mart", "Acme", "Milk");
    tagged.tag_ids = vec![foreign.id];
    let err = service(&conn).record_purchase(&tagged).unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
}

#[test]
fn stock_failure_does_not_roll_back_purchase() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();

    let mut missing_sheet = purchase(household, "Mart", "Acme", "Milk");
    missing_sheet.stock = StockTarget::Sheet(Uuid::new_v4());
    let outcome = service(&conn).record_purchase(&missing_sheet).unwrap();

    assert!(outcome.stock_item.is_none());
    assert!(outcome.catalog_updated);
    assert_eq!(count_rows(&conn, "line_items"), 1);
    assert_eq!(count_rows(&conn, "ledger_entries"), 1);
    assert_eq!(count_rows(&conn, "stock_items"), 0);
}

#[test]
fn stock_creation_can_be_skipped() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();

    let mut skipped = purchase(household, "Mart", "Acme", "Milk");
    skipped.stock = StockTarget::Skip;
    assert!(service(&conn).record_purchase(&skipped).unwrap().stock_item.is_none());

    let config = EngineConfig {
        stock_from_purchases: false,
        ..EngineConfig::default()
    };
    let no_stock = PurchaseService::new(&conn, SqliteScheduleRepository::new(&conn), &config);
    let outcome = no_stock
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();
    assert!(outcome.stock_item.is_none());
    assert_eq!(count_rows(&conn, "stock_items"), 0);
}

#[test]
fn configured_sheet_and_task_title_are_used() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        default_stock_sheet: "Garage".to_string(),
        scheduler_task_title: "Costco run".to_string(),
        ..EngineConfig::default()
    };
    let purchases = PurchaseService::with_sqlite_scheduler(&conn, &config);

    let outcome = purchases
        .record_purchase(&purchase(Uuid::new_v4(), "Mart", "Acme", "Milk"))
        .unwrap();
    let sheet = SqliteStockRepository::new(&conn)
        .get_sheet(outcome.stock_item.unwrap().sheet_id)
        .unwrap()
        .unwrap();
    assert_eq!(sheet.name, "Garage");
    assert_eq!(outcome.scheduled_task.unwrap().title, "Costco run");
}

#[test]
fn scheduler_failure_is_advisory() {
    let conn = open_db_in_memory().unwrap();
    let purchases = PurchaseService::new(&conn, RejectingScheduler, &EngineConfig::default());

    let outcome = purchases
        .record_purchase(&purchase(Uuid::new_v4(), "Mart", "Acme", "Milk"))
        .unwrap();

    assert!(!outcome.scheduler_synced());
    assert_eq!(count_rows(&conn, "line_items"), 1);
    assert_eq!(count_rows(&conn, "scheduled_tasks"), 0);
}

#[test]
fn missing_date_falls_back_to_today() {
    let conn = open_db_in_memory().unwrap();
    let mut undated = purchase(Uuid::new_v4(), "Mart", "Acme", "Milk");
    undated.purchased_on = None;

    let before = Local::now().date_naive();
    let outcome = service(&conn).record_purchase(&undated).unwrap();
    let after = Local::now().date_naive();

    let recorded = outcome.line_item.purchased_on;
    assert!(recorded == before || recorded == after);
    assert_eq!(outcome.ledger_entry.entry_date, recorded);
}

#[test]
fn store_source_is_reused_and_matched_case_sensitively() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let user = Uuid::new_v4();
    let ledger = LedgerService::new(SqliteLedgerRepository::new(&conn));

    let first = ledger
        .get_or_create_source_for_store(household, user, "Mart")
        .unwrap();
    let second = ledger
        .get_or_create_source_for_store(household, user, "Mart")
        .unwrap();
    let lower = ledger
        .get_or_create_source_for_store(household, user, "mart")
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_ne!(first.id, lower.id);
    assert_eq!(count_rows(&conn, "ledger_sources"), 2);
}

#[test]
fn duplicate_store_sources_resolve_to_oldest() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let user = Uuid::new_v4();
    let repo = SqliteLedgerRepository::new(&conn);
    let duplicate = larder_core::repo::ledger_repo::NewLedgerSource {
        household_id: household,
        user_id: user,
        name: "Mart".to_string(),
        kind: larder_core::model::ledger::EntryKind::Expense,
        amount_cents: 0,
        recurring: false,
    };
    let oldest = repo.create_source(&duplicate).unwrap();
    repo.create_source(&duplicate).unwrap();

    let resolved = LedgerService::new(SqliteLedgerRepository::new(&conn))
        .get_or_create_source_for_store(household, user, "Mart")
        .unwrap();
    assert_eq!(resolved.id, oldest.id);
}

#[test]
fn catalog_defaults_follow_latest_purchase() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let mut milk = purchase(household, "Mart", "Acme", "Milk");
    milk.unit = Some("gal".to_string());
    milk.quantity = Some(1.0);
    purchases.record_purchase(&milk).unwrap();

    let mut butter = purchase(household, "Mart", "acme", "Butter");
    butter.unit = Some("lb".to_string());
    butter.quantity = None;
    purchases.record_purchase(&butter).unwrap();

    let learning = LearningService::new(
        SqliteCatalogRepository::new(&conn),
        SqliteCorrectionRepository::new(&conn),
    );
    let entry = learning.catalog_defaults(household, "ACME").unwrap().unwrap();
    assert_eq!(entry.default_item.as_deref(), Some("Butter"));
    assert_eq!(entry.default_unit.as_deref(), Some("lb"));
    assert_eq!(entry.default_quantity, None);
    assert_eq!(count_rows(&conn, "catalog_entries"), 1);

    assert!(learning
        .catalog_defaults(household, "Unknown")
        .unwrap()
        .is_none());
}

#[test]
fn receipt_hints_teach_the_correction_store() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();

    let mut hinted = purchase(household, "Mart", "Acme", "Milk");
    hinted.taxable = true;
    hinted.unit = Some("gal".to_string());
    hinted.hints = Some(ReceiptHints {
        raw_text: Some("ACME   MLK 1GAL".to_string()),
        tax_indicator: Some("T".to_string()),
        tax_rate: Some(0.0625),
    });
    let outcome = service(&conn).record_purchase(&hinted).unwrap();
    assert!(outcome.hints_learned);

    let learning = LearningService::new(
        SqliteCatalogRepository::new(&conn),
        SqliteCorrectionRepository::new(&conn),
    );
    let correction = learning
        .lookup_correction(household, "ACME MLK 1GAL")
        .unwrap()
        .unwrap();
    assert_eq!(correction.fields.brand.as_deref(), Some("Acme"));
    assert_eq!(correction.fields.item_name.as_deref(), Some("Milk"));
    assert_eq!(correction.fields.unit.as_deref(), Some("gal"));

    let rule = learning
        .lookup_tax_meaning(household, "mart", "t")
        .unwrap()
        .unwrap();
    assert!(rule.is_taxable);
    assert_eq!(rule.rate, Some(0.0625));
}

#[test]
fn usage_mode_is_inherited_then_synced_when_explicit() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let purchases = service(&conn);

    let first = purchases
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();
    assert_eq!(first.line_item.usage_mode, UsageMode::Count);
    assert!(first.usage_sync.is_none());

    let mut explicit = purchase(household, "Mart", "ACME", "milk");
    explicit.usage_mode = Some(UsageMode::Quantity);
    let second = purchases.record_purchase(&explicit).unwrap();
    let report = second.usage_sync.unwrap();
    assert_eq!(report.line_items, 1);
    assert_eq!(report.stock_items, 1);

    let refreshed = TripService::new(&conn)
        .get_line_item(first.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.usage_mode, UsageMode::Quantity);

    let third = purchases
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();
    assert_eq!(third.line_item.usage_mode, UsageMode::Quantity);
    assert_eq!(
        third.stock_item.unwrap().usage_mode,
        UsageMode::Quantity
    );
}

#[test]
fn failed_back_reference_rolls_back_the_whole_purchase() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TRIGGER block_entry_link
         BEFORE UPDATE OF line_item_id ON ledger_entries
         WHEN NEW.line_item_id IS NOT NULL
         BEGIN
             SELECT RAISE(ABORT, 'entry link blocked');
         END;",
    )
    .unwrap();

    let err = service(&conn)
        .record_purchase(&purchase(Uuid::new_v4(), "Mart", "Acme", "Milk"))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Transaction(_)));
    assert_eq!(err.code(), "transaction");

    for table in [
        "ledger_entries",
        "line_items",
        "shopping_events",
        "stops",
        "ledger_sources",
        "stock_items",
        "catalog_entries",
        "scheduled_tasks",
    ] {
        assert_eq!(count_rows(&conn, table), 0, "{table} should be empty");
    }
}

#[test]
fn failed_usage_sync_reports_committed_purchase() {
    let conn = open_db_in_memory().unwrap();
    let household = Uuid::new_v4();
    let earlier = service(&conn)
        .record_purchase(&purchase(household, "Mart", "Acme", "Milk"))
        .unwrap();
    conn.execute_batch(
        "CREATE TRIGGER block_mode_change
         BEFORE UPDATE OF usage_mode ON line_items
         BEGIN
             SELECT RAISE(ABORT, 'usage mode locked');
         END;",
    )
    .unwrap();

    let err = service(&conn)
        .record_purchase(&RecordPurchase {
            usage_mode: Some(UsageMode::Quantity),
            ..purchase(household, "Mart", "ACME", "milk")
        })
        .unwrap_err();
    assert_eq!(err.code(), "partially_applied");
    let committed_id = match &err {
        ReconcileError::PartiallyApplied { committed_id, .. } => *committed_id,
        other => panic!("expected a partially applied purchase, got {other:?}"),
    };

    let trips = TripService::new(&conn);
    let committed = trips.get_line_item(committed_id).unwrap().unwrap();
    assert_eq!(committed.usage_mode, UsageMode::Quantity);
    assert_eq!(committed.brand, "ACME");
    let entry = SqliteLedgerRepository::new(&conn)
        .get_entry(committed.ledger_entry_id)
        .unwrap()
        .unwrap();
    assert_eq!(entry.line_item_id, Some(committed_id));

    let untouched = trips.get_line_item(earlier.line_item.id).unwrap().unwrap();
    assert_eq!(untouched.usage_mode, UsageMode::Count);
    assert_eq!(count_rows(&conn, "line_items"), 2);
}
