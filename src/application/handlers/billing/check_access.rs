//! CheckAccessHandler - Query handler telling the selling application whether
//! a purchase is paid and, for subscriptions, still active.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{is_paid, BillingError, Purchase, SubscriptionState, MAX_CHAIN_DEPTH};
use crate::domain::foundation::PurchaseId;
use crate::ports::{Clock, PurchaseStore};

/// Query for one purchase.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub purchase_id: PurchaseId,
}

/// Result of access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAccessResult {
    /// Paid here or through a parent, or gratis, and not blocked.
    pub is_paid: bool,
    /// Subscription within its deadline (or gratis) and not blocked. Always
    /// false for one-time purchases.
    pub is_active: bool,
    /// `Blocked` whenever the purchase is blocked.
    pub subscription_state: Option<SubscriptionState>,
}

/// Handler for access checks.
pub struct CheckAccessHandler {
    store: Arc<dyn PurchaseStore>,
    clock: Arc<dyn Clock>,
}

impl CheckAccessHandler {
    pub fn new(store: Arc<dyn PurchaseStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn handle(&self, query: CheckAccessQuery) -> Result<CheckAccessResult, BillingError> {
        let chain = self.load_chain(query.purchase_id).await?;
        let purchase = chain
            .get(&query.purchase_id)
            .ok_or(BillingError::PurchaseNotFound(query.purchase_id))?;

        Ok(CheckAccessResult {
            is_paid: is_paid(purchase, |id| chain.get(&id)),
            is_active: purchase.is_active(self.clock.today()),
            subscription_state: purchase.subscription_state(),
        })
    }

    /// The purchase and its ancestors, stopping at a missing parent, a loop
    /// or the depth limit.
    async fn load_chain(&self, start: PurchaseId) -> Result<HashMap<PurchaseId, Purchase>, BillingError> {
        let mut chain = HashMap::new();
        let mut next = Some(start);

        while let Some(id) = next {
            if chain.contains_key(&id) || chain.len() > MAX_CHAIN_DEPTH {
                break;
            }
            let Some(purchase) = self.store.find_purchase(id).await? else {
                break;
            };
            next = purchase.parent_id;
            chain.insert(id, purchase);
        }
        Ok(chain)
    }
}
