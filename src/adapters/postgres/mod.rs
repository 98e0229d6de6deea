//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresPurchaseStore` - Purchases, payments, transactions and the
//!   processed-notification ledger

mod purchase_store;

pub use purchase_store::{PostgresPurchaseStore, PostgresPurchaseTransaction};
