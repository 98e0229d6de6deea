//! Recurring Billing - Subscription lifecycle engine driven by PayPal IPN.
//!
//! This crate keeps purchases, payments and subscription due dates in sync
//! with PayPal instant payment notifications, and reminds customers before
//! their subscriptions lapse.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
