//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors, state machine)
//! - `billing` - Purchases, payments and the subscription lifecycle
//! - `ipn` - PayPal instant payment notifications and checkout fields

pub mod billing;
pub mod foundation;
pub mod ipn;
