//! Reconciliation use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the purchase workflow, edits with
//!   propagation, the deletion cascade and the learning store.
//! - Own transaction boundaries; repositories never open their own.

pub mod error;
pub mod learning_service;
pub mod ledger_service;
pub mod purchase_service;
pub mod stock_service;
pub mod trip_service;
pub mod usage_sync;
