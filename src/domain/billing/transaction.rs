//! Transactions - one hand-off of a purchase to a payment processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PurchaseId, TransactionId};

use super::payment::Processor;
use super::purchase::Purchase;

/// Whether the processor charges once or sets up an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    OneTime,
    Subscription,
}

impl TransactionKind {
    /// Agreement checkout for subscriptions, a single charge otherwise.
    pub fn for_purchase(purchase: &Purchase) -> Self {
        if purchase.is_subscription() {
            TransactionKind::Subscription
        } else {
            TransactionKind::OneTime
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::OneTime => "one_time",
            TransactionKind::Subscription => "subscription",
        }
    }
}

/// A checkout started for a purchase.
///
/// The transaction id is what the correlation token carries, so a notification
/// leads back to exactly one transaction and its purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub processor: Processor,
    pub created_at: DateTime<Utc>,
    pub purchase_id: PurchaseId,
    pub kind: TransactionKind,
}

impl Transaction {
    /// Picks the kind from the purchase variant.
    pub fn for_purchase(
        id: TransactionId,
        processor: Processor,
        purchase: &Purchase,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            processor,
            created_at,
            purchase_id: purchase.id,
            kind: TransactionKind::for_purchase(purchase),
        }
    }

    /// Billing cycle sequence reported to the processor.
    ///
    /// An upgrade is invoiced on the cycle of the subscription it replaces,
    /// so `replaced` must be that purchase when `purchase.old_subscription_id`
    /// is set.
    pub fn subinvoice(&self, purchase: &Purchase, replaced: Option<&Purchase>) -> i32 {
        match self.kind {
            TransactionKind::OneTime => 1,
            TransactionKind::Subscription => replaced
                .filter(|_| purchase.old_subscription_id.is_some())
                .unwrap_or(purchase)
                .subscription()
                .map_or(1, |details| details.subinvoice),
        }
    }

    /// Invoice id the processor uses to refuse a second payment for the same
    /// cycle.
    ///
    /// `"<realm> p-<purchase>"` for one-time sales,
    /// `"<realm> <purchase>-<subinvoice>"` for subscriptions with a `-u`
    /// suffix on upgrades.
    pub fn invoice_id(&self, realm: &str, purchase: &Purchase, replaced: Option<&Purchase>) -> String {
        match self.kind {
            TransactionKind::OneTime => format!("{} p-{}", realm, purchase.id),
            TransactionKind::Subscription => {
                let subinvoice = self.subinvoice(purchase, replaced);
                if purchase.old_subscription_id.is_some() {
                    format!("{} {}-{}-u", realm, purchase.id, subinvoice)
                } else {
                    format!("{} {}-{}", realm, purchase.id, subinvoice)
                }
            }
        }
    }
}
