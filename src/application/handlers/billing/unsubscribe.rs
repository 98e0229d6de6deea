//! UnsubscribeHandler - Command handler for a customer canceling their
//! subscription.
//!
//! The agreement is canceled at PayPal; the local purchase changes when
//! PayPal's cancel notification arrives. If PayPal refuses, the purchase is
//! canceled locally and the refusal is returned so the caller can tell the
//! customer.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::PurchaseId;

use super::lifecycle::SubscriptionLifecycle;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct UnsubscribeCommand {
    pub purchase_id: PurchaseId,
}

/// Handler for customer cancellations.
pub struct UnsubscribeHandler {
    lifecycle: Arc<SubscriptionLifecycle>,
}

impl UnsubscribeHandler {
    pub fn new(lifecycle: Arc<SubscriptionLifecycle>) -> Self {
        Self { lifecycle }
    }

    pub async fn handle(&self, cmd: UnsubscribeCommand) -> Result<(), BillingError> {
        self.lifecycle.force_cancel(cmd.purchase_id, false).await?;
        tracing::info!(purchase_id = %cmd.purchase_id, "Unsubscribe requested");
        Ok(())
    }
}
