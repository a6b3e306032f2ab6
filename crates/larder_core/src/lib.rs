//! Purchase reconciliation engine for the larder household planner.
//! This crate is the single source of truth for trip, ledger, stock and
//! learning invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError, LoggingStatus};
pub use repo::schedule_repo::{Scheduler, SchedulerError, SqliteScheduleRepository};
pub use repo::{RepoError, RepoResult};
pub use service::error::{ReconcileError, ReconcileResult};
pub use service::learning_service::LearningService;
pub use service::ledger_service::LedgerService;
pub use service::purchase_service::{
    NewStop, PurchaseEdit, PurchaseOutcome, PurchaseService, PurchaseUpdate, ReceiptHints,
    RecordPurchase, StockTarget, StopTarget, StoreSelector,
};
pub use service::stock_service::{StockItemInput, StockService};
pub use service::trip_service::{DeleteReport, HouseholdOverview, TripService};
pub use service::usage_sync::UsageSyncReport;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns the newest schema version this build can migrate to.
pub fn schema_version() -> u32 {
    db::migrations::latest_version()
}
