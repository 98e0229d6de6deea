//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod billing;

pub use billing::{
    BeginCheckoutCommand, BeginCheckoutHandler, BeginCheckoutResult, CheckAccessHandler,
    CheckAccessQuery, CheckAccessResult, HandleNotificationCommand, HandleNotificationHandler,
    HandleNotificationResult, NotificationSettings, OutgoingEmail, ReminderSettings,
    RunRemindersHandler, RunRemindersResult, SubscriptionLifecycle, UnsubscribeCommand,
    UnsubscribeHandler,
};
