//! Billing domain module.
//!
//! Purchases, their payments and the subscription lifecycle.
//!
//! # Module Structure
//!
//! - `period` / `date_offset` - Calendar periods and due-date arithmetic
//! - `item` / `purchase` / `payment` / `transaction` - Data model
//! - `lifecycle` - Subscription state changes on a loaded purchase
//! - `aggregate` - Bundle totals and the paid parent chain
//! - `token` - Signed correlation token
//! - `reminder` - Reminder thresholds and candidate query

mod aggregate;
mod date_offset;
mod errors;
mod item;
mod lifecycle;
mod payment;
mod period;
mod purchase;
mod reminder;
mod token;
mod transaction;

pub use aggregate::{calc, is_paid, paid_via_chain, MAX_CHAIN_DEPTH};
pub use date_offset::offset_date;
pub use errors::BillingError;
pub use item::{Currency, Item, ItemKind, Product, SubscriptionTerms};
pub use lifecycle::{Activation, CancelNotice};
pub use payment::{NewPayment, Payment, PaymentKind, Processor};
pub use period::{Period, PeriodUnit};
pub use purchase::{
    AggregateDetails, OneTimeDetails, PaymentStatus, ProlongDetails, Purchase, PurchaseDetails,
    SubscriptionDetails, SubscriptionState, MAX_REMINDER_LEVEL,
};
pub use reminder::{ReminderCohort, ReminderQuery, ReminderThreshold};
pub use token::TokenCodec;
pub use transaction::{Transaction, TransactionKind};

#[cfg(test)]
pub(crate) use purchase::fixtures;
