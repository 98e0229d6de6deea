//! Billing handlers.
//!
//! ## Commands
//! - Handling PayPal notifications
//! - Starting a checkout
//! - Customer unsubscribe
//! - The reminder run
//!
//! ## Queries
//! - Paid / active checks for the selling application
//!
//! `SubscriptionLifecycle` holds the lifecycle steps shared by several
//! handlers.

mod begin_checkout;
mod check_access;
mod handle_notification;
mod lifecycle;
mod run_reminders;
mod unsubscribe;

#[cfg(test)]
pub(crate) mod test_support;

// Commands
pub use begin_checkout::{BeginCheckoutCommand, BeginCheckoutHandler, BeginCheckoutResult};
pub use handle_notification::{
    HandleNotificationCommand, HandleNotificationHandler, HandleNotificationResult,
    NotificationSettings,
};
pub use run_reminders::{ReminderSettings, RunRemindersHandler, RunRemindersResult};
pub use unsubscribe::{UnsubscribeCommand, UnsubscribeHandler};

// Queries
pub use check_access::{CheckAccessHandler, CheckAccessQuery, CheckAccessResult};

pub use lifecycle::{OutgoingEmail, SubscriptionLifecycle};
