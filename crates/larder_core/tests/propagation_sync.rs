use chrono::NaiveDate;
use larder_core::db::open_db_in_memory;
use larder_core::model::trip::UsageMode;
use larder_core::repo::ledger_repo::{LedgerRepository, SqliteLedgerRepository};
use larder_core::repo::stock_repo::{SqliteStockRepository, StockRepository};
use larder_core::{
    EngineConfig, NewStop, PurchaseEdit, PurchaseOutcome, PurchaseService, ReconcileError,
    RecordPurchase, SqliteScheduleRepository, StockItemInput, StockService, StockTarget,
    StopTarget, StoreSelector, TripService,
};
use rusqlite::Connection;
use uuid::Uuid;

struct Fixture {
    conn: Connection,
    household: Uuid,
}

impl Fixture {
    fn new() -> Self {
        Self {
            conn: open_db_in_memory().unwrap(),
            household: Uuid::new_v4(),
        }
    }

    fn purchases(&self) -> PurchaseService<'_, SqliteScheduleRepository<'_>> {
        PurchaseService::new(
            &self.conn,
            SqliteScheduleRepository::new(&self.conn),
            &EngineConfig::default(),
        )
    }

    fn buy(&self, store: &str, brand: &str, item: &str, unit: Option<&str>) -> PurchaseOutcome {
        self.purchases()
            .record_purchase(&RecordPurchase {
                household_id: self.household,
                user_id: Uuid::new_v4(),
                stop: StopTarget::New(NewStop {
                    trip_id: None,
                    store: StoreSelector::Freeform(store.to_string()),
                }),
                brand: brand.to_string(),
                item_name: item.to_string(),
                count: 2.0,
                quantity: Some(16.0),
                unit: unit.map(str::to_string),
                unit_price_cents: Some(300),
                total_cents: None,
                taxable: false,
                purchased_on: Some(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
                tag_ids: Vec::new(),
                usage_mode: None,
                stock: StockTarget::DefaultSheet,
                hints: None,
            })
            .unwrap()
    }

    fn line_item_unit(&self, outcome: &PurchaseOutcome) -> Option<String> {
        TripService::new(&self.conn)
            .get_line_item(outcome.line_item.id)
            .unwrap()
            .unwrap()
            .unit
    }

    fn stock_unit(&self, outcome: &PurchaseOutcome) -> Option<String> {
        SqliteStockRepository::new(&self.conn)
            .get_item(outcome.stock_item.as_ref().unwrap().id)
            .unwrap()
            .unwrap()
            .unit
    }
}

fn unit_edit(unit: &str) -> PurchaseEdit {
    PurchaseEdit {
        unit: Some(Some(unit.to_string())),
        ..PurchaseEdit::default()
    }
}

#[test]
fn unit_propagation_matches_old_value_only() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    let b = fx.buy("Mart", "Acme", "Cream", Some("ml"));
    let c = fx.buy("Mart", "Acme", "Cheese", Some("oz"));
    let other_store = fx.buy("Corner", "Acme", "Milk", Some("oz"));
    let other_brand = fx.buy("Mart", "Bolt", "Milk", Some("oz"));

    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &unit_edit("g"), true)
        .unwrap();

    assert_eq!(update.line_item.unit.as_deref(), Some("g"));
    assert_eq!(fx.line_item_unit(&b).as_deref(), Some("ml"));
    assert_eq!(fx.line_item_unit(&c).as_deref(), Some("g"));
    assert_eq!(fx.line_item_unit(&other_store).as_deref(), Some("oz"));
    assert_eq!(fx.line_item_unit(&other_brand).as_deref(), Some("oz"));
    assert_eq!(update.propagated_line_items, 1);

    assert_eq!(fx.stock_unit(&a).as_deref(), Some("g"));
    assert_eq!(fx.stock_unit(&c).as_deref(), Some("g"));
    assert_eq!(fx.stock_unit(&b).as_deref(), Some("ml"));
    assert_eq!(fx.stock_unit(&other_store).as_deref(), Some("oz"));
    assert_eq!(update.propagated_stock_items, 2);
}

#[test]
fn edits_without_propagate_stay_local() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    let b = fx.buy("Mart", "Acme", "Cheese", Some("oz"));

    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &unit_edit("g"), false)
        .unwrap();

    assert_eq!(update.propagated_line_items, 0);
    assert_eq!(update.propagated_stock_items, 0);
    assert_eq!(fx.line_item_unit(&b).as_deref(), Some("oz"));
    assert_eq!(fx.stock_unit(&a).as_deref(), Some("oz"));
}

#[test]
fn price_edit_updates_totals_and_ledger_amounts() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    let b = fx.buy("Mart", "Acme", "Cheese", None);

    let edit = PurchaseEdit {
        unit_price_cents: Some(350),
        ..PurchaseEdit::default()
    };
    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &edit, true)
        .unwrap();

    assert_eq!(update.line_item.total_cents, 700);
    assert_eq!(update.ledger_entry.amount_cents, 700);

    let sibling = TripService::new(&fx.conn)
        .get_line_item(b.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling.unit_price_cents, 350);
    assert_eq!(sibling.total_cents, 700);
    let sibling_entry = SqliteLedgerRepository::new(&fx.conn)
        .get_entry(b.ledger_entry.id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling_entry.amount_cents, 700);

    let sibling_stock = SqliteStockRepository::new(&fx.conn)
        .get_item(b.stock_item.as_ref().unwrap().id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling_stock.unit_price_cents, Some(350));
}

#[test]
fn count_edit_recomputes_own_total_only() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", None);
    let b = fx.buy("Mart", "Acme", "Cheese", None);

    let edit = PurchaseEdit {
        count: Some(4.0),
        ..PurchaseEdit::default()
    };
    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &edit, true)
        .unwrap();

    assert_eq!(update.line_item.total_cents, 1200);
    assert_eq!(update.ledger_entry.amount_cents, 1200);
    assert_eq!(update.propagated_line_items, 0);
    let sibling = TripService::new(&fx.conn)
        .get_line_item(b.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling.total_cents, 600);
}

#[test]
fn brand_propagation_renames_siblings_at_same_store() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    let b = fx.buy("Mart", "Acme", "Cheese", Some("lb"));
    let elsewhere = fx.buy("Corner", "Acme", "Milk", Some("oz"));

    let edit = PurchaseEdit {
        brand: Some("Acme Farms".to_string()),
        unit: Some(Some("g".to_string())),
        ..PurchaseEdit::default()
    };
    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &edit, true)
        .unwrap();
    assert_eq!(update.propagated_line_items, 1);

    let trips = TripService::new(&fx.conn);
    let sibling = trips.get_line_item(b.line_item.id).unwrap().unwrap();
    assert_eq!(sibling.brand, "Acme Farms");
    assert_eq!(sibling.unit.as_deref(), Some("lb"));
    let far = trips.get_line_item(elsewhere.line_item.id).unwrap().unwrap();
    assert_eq!(far.brand, "Acme");

    let sibling_stock = SqliteStockRepository::new(&fx.conn)
        .get_item(b.stock_item.as_ref().unwrap().id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling_stock.brand, "Acme Farms");
}

#[test]
fn usage_mode_edit_syncs_matching_rows_case_insensitively() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", None);
    let b = fx.buy("Corner", "acme", "MILK", None);
    let unrelated = fx.buy("Mart", "Acme", "Cheese", None);

    let edit = PurchaseEdit {
        usage_mode: Some(UsageMode::Quantity),
        ..PurchaseEdit::default()
    };
    let update = fx
        .purchases()
        .update_purchase(a.line_item.id, &edit, false)
        .unwrap();

    let report = update.usage_sync.unwrap();
    assert_eq!(report.line_items, 1);
    assert_eq!(report.stock_items, 2);

    let trips = TripService::new(&fx.conn);
    let stock = SqliteStockRepository::new(&fx.conn);
    for outcome in [&a, &b] {
        let item = trips.get_line_item(outcome.line_item.id).unwrap().unwrap();
        assert_eq!(item.usage_mode, UsageMode::Quantity);
        let stocked = stock
            .get_item(outcome.stock_item.as_ref().unwrap().id)
            .unwrap()
            .unwrap();
        assert_eq!(stocked.usage_mode, UsageMode::Quantity);
    }
    let untouched = trips.get_line_item(unrelated.line_item.id).unwrap().unwrap();
    assert_eq!(untouched.usage_mode, UsageMode::Count);
}

#[test]
fn stock_usage_mode_change_syncs_line_items() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", None);
    let b = fx.buy("Mart", "ACME", "milk", None);
    let stock_service = StockService::new(&fx.conn, &EngineConfig::default());

    let report = stock_service
        .set_stock_usage_mode(a.stock_item.as_ref().unwrap().id, UsageMode::Quantity)
        .unwrap();
    assert_eq!(report.line_items, 2);
    assert_eq!(report.stock_items, 1);

    let trips = TripService::new(&fx.conn);
    assert_eq!(
        trips.get_line_item(b.line_item.id).unwrap().unwrap().usage_mode,
        UsageMode::Quantity
    );

    let err = stock_service
        .set_stock_usage_mode(Uuid::new_v4(), UsageMode::Count)
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { entity: "stock item", .. }));
}

#[test]
fn standalone_stock_items_inherit_and_sync_usage_mode() {
    let fx = Fixture::new();
    let stock_service = StockService::new(&fx.conn, &EngineConfig::default());
    let base = StockItemInput {
        household_id: fx.household,
        sheet: None,
        name: "Rice".to_string(),
        brand: "Acme".to_string(),
        count: 1.0,
        quantity: Some(5.0),
        unit: Some("lb".to_string()),
        unit_price_cents: None,
        usage_mode: Some(UsageMode::Quantity),
    };
    let first = stock_service.create_item(&base).unwrap();
    assert_eq!(first.usage_mode, UsageMode::Quantity);
    assert_eq!(first.purchase_id, None);

    let inherited = stock_service
        .create_item(&StockItemInput {
            sheet: Some("Garage".to_string()),
            name: "rice".to_string(),
            usage_mode: None,
            ..base.clone()
        })
        .unwrap();
    assert_eq!(inherited.usage_mode, UsageMode::Quantity);
    assert_ne!(inherited.sheet_id, first.sheet_id);

    let blank = stock_service
        .create_item(&StockItemInput {
            name: " ".to_string(),
            ..base
        })
        .unwrap_err();
    assert!(matches!(blank, ReconcileError::Validation(_)));
}

#[test]
fn update_validation_rejects_bad_edits_before_writing() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    let purchases = fx.purchases();

    let blank = PurchaseEdit {
        brand: Some("   ".to_string()),
        ..PurchaseEdit::default()
    };
    assert!(matches!(
        purchases.update_purchase(a.line_item.id, &blank, true).unwrap_err(),
        ReconcileError::Validation(_)
    ));

    let negative = PurchaseEdit {
        unit_price_cents: Some(-5),
        ..PurchaseEdit::default()
    };
    assert!(matches!(
        purchases.update_purchase(a.line_item.id, &negative, true).unwrap_err(),
        ReconcileError::Validation(_)
    ));

    assert!(matches!(
        purchases
            .update_purchase(Uuid::new_v4(), &unit_edit("g"), true)
            .unwrap_err(),
        ReconcileError::NotFound { entity: "line item", .. }
    ));

    let stored = TripService::new(&fx.conn)
        .get_line_item(a.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.brand, "Acme");
    assert_eq!(stored.unit_price_cents, 300);
}

fn mode_edit(mode: UsageMode) -> PurchaseEdit {
    PurchaseEdit {
        usage_mode: Some(mode),
        ..PurchaseEdit::default()
    }
}

fn brand_edit(brand: &str) -> PurchaseEdit {
    PurchaseEdit {
        brand: Some(brand.to_string()),
        ..PurchaseEdit::default()
    }
}

#[test]
fn rename_into_existing_pair_adopts_its_usage_mode() {
    let fx = Fixture::new();
    let acme = fx.buy("Mart", "Acme", "Milk", None);
    let bolt = fx.buy("Corner", "Bolt", "Milk", None);
    fx.purchases()
        .update_purchase(bolt.line_item.id, &mode_edit(UsageMode::Quantity), false)
        .unwrap();

    let update = fx
        .purchases()
        .update_purchase(acme.line_item.id, &brand_edit("BOLT"), false)
        .unwrap();
    assert_eq!(update.line_item.usage_mode, UsageMode::Quantity);

    let trips = TripService::new(&fx.conn);
    let stored = trips.get_line_item(acme.line_item.id).unwrap().unwrap();
    assert_eq!(stored.usage_mode, UsageMode::Quantity);
    let sibling = trips.get_line_item(bolt.line_item.id).unwrap().unwrap();
    assert_eq!(sibling.usage_mode, UsageMode::Quantity);
}

#[test]
fn explicit_mode_on_rename_wins_and_syncs_the_new_pair() {
    let fx = Fixture::new();
    let acme = fx.buy("Mart", "Acme", "Milk", None);
    let bolt = fx.buy("Corner", "Bolt", "Milk", None);
    fx.purchases()
        .update_purchase(bolt.line_item.id, &mode_edit(UsageMode::Quantity), false)
        .unwrap();

    let edit = PurchaseEdit {
        brand: Some("Bolt".to_string()),
        usage_mode: Some(UsageMode::Count),
        ..PurchaseEdit::default()
    };
    let update = fx
        .purchases()
        .update_purchase(acme.line_item.id, &edit, false)
        .unwrap();
    assert_eq!(update.line_item.usage_mode, UsageMode::Count);
    assert_eq!(update.usage_sync.unwrap().line_items, 1);

    let sibling = TripService::new(&fx.conn)
        .get_line_item(bolt.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(sibling.usage_mode, UsageMode::Count);
}

#[test]
fn brand_propagation_moves_siblings_into_the_target_pair_mode() {
    let fx = Fixture::new();
    let origin = fx.buy("Mart", "Acme", "Milk", None);
    let sibling = fx.buy("Mart", "Acme", "Cheese", None);
    let target = fx.buy("Corner", "Bolt", "Cheese", None);
    fx.purchases()
        .update_purchase(target.line_item.id, &mode_edit(UsageMode::Quantity), false)
        .unwrap();

    let update = fx
        .purchases()
        .update_purchase(origin.line_item.id, &brand_edit("Bolt"), true)
        .unwrap();
    assert_eq!(update.propagated_line_items, 1);
    assert_eq!(update.line_item.usage_mode, UsageMode::Count);
    let report = update.usage_sync.unwrap();
    assert_eq!(report.line_items, 1);
    assert_eq!(report.stock_items, 1);

    let moved = TripService::new(&fx.conn)
        .get_line_item(sibling.line_item.id)
        .unwrap()
        .unwrap();
    assert_eq!(moved.brand, "Bolt");
    assert_eq!(moved.usage_mode, UsageMode::Quantity);
    let moved_stock = SqliteStockRepository::new(&fx.conn)
        .get_item(sibling.stock_item.as_ref().unwrap().id)
        .unwrap()
        .unwrap();
    assert_eq!(moved_stock.brand, "Bolt");
    assert_eq!(moved_stock.usage_mode, UsageMode::Quantity);
}

#[test]
fn failed_propagation_keeps_the_committed_edit() {
    let fx = Fixture::new();
    let a = fx.buy("Mart", "Acme", "Milk", Some("oz"));
    fx.buy("Mart", "Acme", "Cheese", Some("oz"));
    fx.conn
        .execute_batch(
            "CREATE TRIGGER freeze_stock_units
             BEFORE UPDATE OF unit ON stock_items
             BEGIN
                 SELECT RAISE(ABORT, 'stock units frozen');
             END;",
        )
        .unwrap();

    let err = fx
        .purchases()
        .update_purchase(a.line_item.id, &unit_edit("g"), true)
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::PartiallyApplied { committed_id, .. } if committed_id == a.line_item.id
    ));
    assert_eq!(fx.line_item_unit(&a).as_deref(), Some("g"));
    assert_eq!(fx.stock_unit(&a).as_deref(), Some("oz"));
}
