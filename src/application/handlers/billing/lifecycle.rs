//! SubscriptionLifecycle - Lifecycle operations that touch storage or the
//! processor.
//!
//! Operations taking a `&mut dyn PurchaseTransaction` run inside the caller's
//! unit of work and return the emails to send once it commits. The others
//! open their own transactions.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;

use crate::domain::billing::{calc, BillingError, PaymentStatus, Purchase};
use crate::domain::foundation::PurchaseId;
use crate::ports::{
    Clock, EmailSender, EmailTemplate, ProcessorClient, ProcessorError, PurchaseStore,
    PurchaseTransaction,
};

/// An email to send after the surrounding transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub template: EmailTemplate,
    pub recipient: String,
    pub context: serde_json::Value,
}

/// Cancel notice for `purchase`, or `None` without a known address.
fn cancel_email(purchase: &Purchase, today: NaiveDate) -> Option<OutgoingEmail> {
    let details = purchase.subscription()?;
    let recipient = details.email.clone()?;
    let days_before = (details.due_payment_date - today).num_days();
    Some(OutgoingEmail {
        template: EmailTemplate::SubscriptionCanceled,
        recipient,
        context: json!({
            "purchase_id": purchase.id.as_i64(),
            "product": purchase.item.product_name(),
            "due_date": details.due_payment_date.to_string(),
            "days_before": days_before,
        }),
    })
}

/// Storage- and processor-facing half of the subscription lifecycle.
pub struct SubscriptionLifecycle {
    store: Arc<dyn PurchaseStore>,
    processor: Arc<dyn ProcessorClient>,
    email_sender: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionLifecycle {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        processor: Arc<dyn ProcessorClient>,
        email_sender: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            processor,
            email_sender,
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inside a notification's transaction
    // ════════════════════════════════════════════════════════════════════════════

    /// Records that the processor canceled the agreement.
    ///
    /// Bumps `subinvoice` atomically so the next checkout gets a fresh
    /// invoice id. The cancel email is returned only the first time and never
    /// for a purchase that replaced an older subscription.
    pub async fn cancel_subscription(
        &self,
        tx: &mut dyn PurchaseTransaction,
        purchase: &mut Purchase,
    ) -> Result<Option<OutgoingEmail>, BillingError> {
        let notice = purchase.mark_canceled()?;
        let subinvoice = tx.increment_subinvoice(purchase.id).await?;
        purchase.apply_subinvoice(subinvoice)?;
        tx.save_purchase(purchase).await?;

        tracing::info!(
            purchase_id = %purchase.id,
            subinvoice,
            already_canceled = notice.was_already_canceled,
            "Subscription canceled"
        );

        if !notice.should_notify() {
            return Ok(None);
        }
        Ok(cancel_email(purchase, self.today()))
    }

    /// Moves the subscription a prolong purchase extends forward by its
    /// period, counting from today when the subscription already lapsed.
    pub async fn advance_parent(
        &self,
        tx: &mut dyn PurchaseTransaction,
        prolong: &Purchase,
    ) -> Result<Option<NaiveDate>, BillingError> {
        let Some(details) = prolong.prolongation() else {
            return Ok(None);
        };
        let mut parent = tx
            .lock_purchase(details.prolonged_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(details.prolonged_id))?;

        let due = parent.prolong_by(details.period, self.today())?;
        tx.save_purchase(&parent).await?;
        tx.reset_reminders(parent.id).await?;

        tracing::info!(
            purchase_id = %parent.id,
            prolong_id = %prolong.id,
            due_payment_date = %due,
            "Subscription prolonged"
        );
        Ok(Some(due))
    }

    /// Reverses the payment of `purchase` after the processor refunded it.
    ///
    /// A refunded prolongation also takes its period back from the
    /// subscription it extended, but only on its move from `Paid` to
    /// `Refunded`: later partial refunds and refunds of unpaid prolongations
    /// leave the subscription alone.
    pub async fn refund_payment(
        &self,
        tx: &mut dyn PurchaseTransaction,
        purchase: &mut Purchase,
    ) -> Result<(), BillingError> {
        let was_paid = purchase.status() == Some(PaymentStatus::Paid);
        purchase.clear_payment()?;
        tx.save_purchase(purchase).await?;

        let retract = purchase.prolongation().filter(|_| was_paid);
        if let Some(details) = retract {
            let mut parent = tx
                .lock_purchase(details.prolonged_id)
                .await?
                .ok_or(BillingError::PurchaseNotFound(details.prolonged_id))?;
            let due = parent.retract_prolongation(details.period)?;
            tx.save_purchase(&parent).await?;

            tracing::info!(
                purchase_id = %parent.id,
                prolong_id = %purchase.id,
                due_payment_date = %due,
                "Prolongation refunded"
            );
        }

        tracing::info!(purchase_id = %purchase.id, "Payment refunded");
        Ok(())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Own transactions
    // ════════════════════════════════════════════════════════════════════════════

    /// Starts the free trial of a new subscription.
    ///
    /// Returns `false` when the item has no trial.
    pub async fn start_trial(&self, purchase_id: PurchaseId) -> Result<bool, BillingError> {
        let mut tx = self.store.begin().await?;
        let mut purchase = tx
            .lock_purchase(purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(purchase_id))?;

        let started = purchase.start_trial(self.today())?;
        if started {
            tx.save_purchase(&purchase).await?;
            tx.commit().await?;
            tracing::info!(purchase_id = %purchase_id, "Trial started");
        } else {
            tx.rollback().await?;
        }
        Ok(started)
    }

    /// Cancels the agreement at the processor.
    ///
    /// Without an agreement this succeeds without calling the processor. On
    /// success the local state is left for the processor's cancel
    /// notification to update. When the processor refuses, the purchase is
    /// canceled locally (without an email) and the refusal is returned.
    pub async fn force_cancel(
        &self,
        purchase_id: PurchaseId,
        is_upgrade: bool,
    ) -> Result<(), BillingError> {
        let purchase = self
            .store
            .find_purchase(purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(purchase_id))?;

        let Some(reference) = purchase
            .subscription()
            .and_then(|details| details.subscription_reference.clone())
        else {
            tracing::debug!(purchase_id = %purchase_id, "No agreement to cancel");
            return Ok(());
        };

        match self.processor.cancel_agreement(&reference, is_upgrade).await {
            Ok(()) => Ok(()),
            Err(ProcessorError::CannotCancel(message)) => {
                tracing::warn!(
                    purchase_id = %purchase_id,
                    agreement = %reference,
                    reason = %message,
                    "Cannot cancel subscription, canceling locally"
                );
                self.cancel_locally(purchase_id, &reference).await?;
                Err(BillingError::CannotCancelSubscription(message))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn cancel_locally(&self, purchase_id: PurchaseId, reference: &str) -> Result<(), BillingError> {
        let mut tx = self.store.begin().await?;
        let Some(mut purchase) = tx.lock_purchase(purchase_id).await? else {
            tx.rollback().await?;
            return Ok(());
        };

        let still_same = purchase
            .subscription()
            .and_then(|details| details.subscription_reference.as_deref())
            == Some(reference);
        if !still_same {
            tx.rollback().await?;
            return Ok(());
        }

        purchase.mark_canceled()?;
        let subinvoice = tx.increment_subinvoice(purchase_id).await?;
        purchase.apply_subinvoice(subinvoice)?;
        tx.save_purchase(&purchase).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cancels the subscription `purchase_id` replaces, then drops the link.
    ///
    /// A refusal from the processor is logged and ignored. Safe to call more
    /// than once.
    pub async fn upgrade_subscription(&self, purchase_id: PurchaseId) -> Result<(), BillingError> {
        let purchase = self
            .store
            .find_purchase(purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(purchase_id))?;
        let Some(old_id) = purchase.old_subscription_id else {
            return Ok(());
        };

        match self.force_cancel(old_id, true).await {
            Ok(()) => {}
            Err(BillingError::CannotCancelSubscription(reason)) => {
                tracing::warn!(
                    purchase_id = %purchase_id,
                    old_purchase_id = %old_id,
                    reason = %reason,
                    "Old subscription was not canceled remotely"
                );
            }
            Err(e) => return Err(e),
        }

        let mut tx = self.store.begin().await?;
        if let Some(mut purchase) = tx.lock_purchase(purchase_id).await? {
            if purchase.old_subscription_id.take().is_some() {
                tx.save_purchase(&purchase).await?;
            }
        }
        tx.commit().await?;

        tracing::info!(purchase_id = %purchase_id, old_purchase_id = %old_id, "Subscription upgraded");
        Ok(())
    }

    /// Recomputes an aggregate's price, shipping and tax from its children.
    pub async fn recalculate_aggregate(&self, aggregate_id: PurchaseId) -> Result<Purchase, BillingError> {
        let mut tx = self.store.begin().await?;
        let mut aggregate = tx
            .lock_purchase(aggregate_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(aggregate_id))?;
        let children = tx.find_children(aggregate_id).await?;

        calc(&mut aggregate, &children)?;
        tx.save_purchase(&aggregate).await?;
        tx.commit().await?;

        tracing::debug!(purchase_id = %aggregate_id, price = %aggregate.price(), "Aggregate recalculated");
        Ok(aggregate)
    }

    /// Sends emails queued during a committed transaction. Failures are
    /// logged.
    pub async fn send_emails(&self, emails: Vec<OutgoingEmail>) {
        for email in emails {
            if let Err(e) = self
                .email_sender
                .send(email.template, &email.recipient, email.context)
                .await
            {
                tracing::error!(template = email.template.id(), error = %e, "Failed to send email");
            }
        }
    }
}
