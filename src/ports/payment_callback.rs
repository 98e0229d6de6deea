//! PaymentCallback port - Hooks for the application selling the goods.
//!
//! Called after the notification's changes are committed. Every method
//! defaults to doing nothing.

use async_trait::async_trait;

use crate::domain::billing::{Payment, Purchase};

#[async_trait]
pub trait PaymentCallback: Send + Sync {
    /// A payment was accepted for `purchase`.
    async fn on_payment(&self, _purchase: &Purchase, _payment: &Payment) {}

    /// A recurring agreement `reference` was set up.
    async fn on_subscription_created(&self, _purchase: &Purchase, _reference: &str) {}

    /// The processor reported the agreement as canceled.
    async fn on_subscription_canceled(&self, _purchase: &Purchase) {}
}

/// Callback that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl PaymentCallback for NoopCallback {}
