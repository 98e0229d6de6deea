//! BeginCheckoutHandler - Command handler that starts a PayPal checkout.
//!
//! Records a transaction for the purchase and returns the form the buyer's
//! browser posts to PayPal. The form's `custom` field carries the signed
//! transaction id that every later notification is matched by.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Processor, TokenCodec, TransactionKind};
use crate::domain::foundation::{PurchaseId, TransactionId};
use crate::domain::ipn::{checkout_form, CheckoutForm, CheckoutSettings};
use crate::ports::{Clock, PurchaseStore};

/// Command to start a checkout.
#[derive(Debug, Clone)]
pub struct BeginCheckoutCommand {
    pub purchase_id: PurchaseId,
}

/// Result of a started checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginCheckoutResult {
    pub transaction_id: TransactionId,
    pub form: CheckoutForm,
}

/// Handler for starting checkouts.
pub struct BeginCheckoutHandler {
    store: Arc<dyn PurchaseStore>,
    clock: Arc<dyn Clock>,
    tokens: TokenCodec,
    settings: CheckoutSettings,
}

impl BeginCheckoutHandler {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        clock: Arc<dyn Clock>,
        tokens: TokenCodec,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            clock,
            tokens,
            settings,
        }
    }

    pub async fn handle(&self, cmd: BeginCheckoutCommand) -> Result<BeginCheckoutResult, BillingError> {
        let mut tx = self.store.begin().await?;

        let purchase = tx
            .lock_purchase(cmd.purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(cmd.purchase_id))?;

        // PayPal cannot start an agreement further out than this
        let today = self.clock.today();
        if purchase.is_subscription() && !purchase.ready_for_subscription(today) {
            tx.rollback().await?;
            return Err(BillingError::InvalidTransition(format!(
                "purchase {} cannot switch to automatic renewal before {}",
                purchase.id,
                purchase
                    .subscription_allowed_date(today)
                    .map_or_else(String::new, |date| date.to_string())
            )));
        }

        let replaced = match purchase.old_subscription_id {
            Some(old_id) => Some(
                tx.lock_purchase(old_id)
                    .await?
                    .ok_or(BillingError::PurchaseNotFound(old_id))?,
            ),
            None => None,
        };

        let transaction = tx
            .create_transaction(
                purchase.id,
                Processor::PayPal,
                TransactionKind::for_purchase(&purchase),
                self.clock.now(),
            )
            .await?;
        tx.commit().await?;

        let invoice = transaction.invoice_id(self.tokens.realm(), &purchase, replaced.as_ref());
        let form = checkout_form(
            &self.settings,
            &purchase,
            self.tokens.encode(transaction.id),
            invoice,
        )?;

        tracing::info!(
            purchase_id = %purchase.id,
            transaction_id = %transaction.id,
            kind = transaction.kind.as_str(),
            "Checkout started"
        );

        Ok(BeginCheckoutResult {
            transaction_id: transaction.id,
            form,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::domain::billing::fixtures::*;
    use crate::domain::foundation::PaymentId;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    fn codec() -> TokenCodec {
        TokenCodec::new("shop", &SecretString::new("test-secret".to_string())).unwrap()
    }

    fn handler(harness: &Harness) -> BeginCheckoutHandler {
        BeginCheckoutHandler::new(
            Arc::new(harness.store.clone()),
            harness.clock.clone(),
            codec(),
            CheckoutSettings {
                business: "seller@example.com".to_string(),
                notify_url: "https://shop.example.com/ipn/paypal".to_string(),
                sandbox: true,
            },
        )
    }

    fn command(id: i64) -> BeginCheckoutCommand {
        BeginCheckoutCommand {
            purchase_id: PurchaseId::new(id),
        }
    }

    #[tokio::test]
    async fn one_time_checkout_carries_token_and_invoice() {
        let harness = Harness::new(date(2024, 2, 15));
        harness.store.insert_purchase(simple(5, Decimal::new(1999, 2))).await;

        let result = handler(&harness).handle(command(5)).await.unwrap();

        assert_eq!(result.form.get("cmd"), Some("_xclick"));
        assert_eq!(result.form.get("invoice"), Some("shop p-5"));
        let token = result.form.get("custom").unwrap();
        assert_eq!(codec().decode(token).unwrap(), result.transaction_id);
    }

    #[tokio::test]
    async fn each_checkout_gets_its_own_transaction() {
        let harness = Harness::new(date(2024, 2, 15));
        harness.store.insert_purchase(simple(5, Decimal::new(1999, 2))).await;
        let handler = handler(&harness);

        let first = handler.handle(command(5)).await.unwrap();
        let second = handler.handle(command(5)).await.unwrap();

        assert_ne!(first.transaction_id, second.transaction_id);
    }

    #[tokio::test]
    async fn upgrade_is_invoiced_on_replaced_cycle() {
        let harness = Harness::new(date(2024, 2, 15));
        let mut old = subscription(1, date(2024, 3, 1));
        old.activate_subscription(crate::domain::billing::Processor::PayPal, "I-OLD", None, PaymentId::new(1))
            .unwrap();
        old.subscription_mut().unwrap().subinvoice = 4;
        harness.store.insert_purchase(old).await;
        harness
            .store
            .insert_purchase(subscription(2, date(2024, 3, 1)).replacing(PurchaseId::new(1)))
            .await;

        let result = handler(&harness).handle(command(2)).await.unwrap();

        assert_eq!(result.form.get("cmd"), Some("_xclick-subscriptions"));
        assert_eq!(result.form.get("invoice"), Some("shop 2-4-u"));
    }

    #[tokio::test]
    async fn subscription_paid_far_ahead_cannot_start_agreement() {
        let harness = Harness::new(date(2024, 1, 1));
        let mut purchase = subscription(1, date(2024, 12, 1));
        purchase.accept_regular_payment(PaymentId::new(2)).unwrap();
        harness.store.insert_purchase(purchase).await;

        let result = handler(&harness).handle(command(1)).await;

        assert!(matches!(result, Err(BillingError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn unknown_purchase_is_not_found() {
        let harness = Harness::new(date(2024, 2, 15));

        let result = handler(&harness).handle(command(3)).await;

        assert!(matches!(result, Err(BillingError::PurchaseNotFound(_))));
    }
}
