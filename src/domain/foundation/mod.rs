//! Foundation module - Shared domain primitives.
//!
//! Identifiers, error types and the lifecycle trait that the billing
//! modules build on.

mod errors;
mod ids;
mod state_machine;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ItemId, PaymentId, ProductId, PurchaseId, TransactionId};
pub use state_machine::StateMachine;
