//! In-memory adapters for tests and local development.

mod purchase_store;

pub use purchase_store::{InMemoryPurchaseStore, InMemoryTransaction};
