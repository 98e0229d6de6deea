//! HandleNotificationHandler - Command handler for PayPal instant payment
//! notifications.
//!
//! A notification is checked (receiver, postback verification, correlation
//! token, amounts) before anything is written. Everything it changes happens
//! in one transaction together with its ledger entry, so a redelivery is
//! recognised and a failure leaves no partial state. Callbacks, emails and
//! the cancel of a replaced subscription run after the commit.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::billing::{
    Activation, BillingError, NewPayment, Payment, Purchase, TokenCodec, Transaction,
};
use crate::domain::foundation::{PurchaseId, TransactionId};
use crate::domain::ipn::{verify_amounts, Classification, Notification, NotificationKind};
use crate::ports::{
    Clock, NotificationRecord, NotificationVerifier, PaymentCallback, ProcessorClient,
    PurchaseStore, PurchaseTransaction, SaveResult, Verification,
};

use super::lifecycle::{OutgoingEmail, SubscriptionLifecycle};

/// PayPal keeps this much of every payment it refunds.
const AUTO_REFUND_FEE: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

/// Merchant settings the engine checks notifications against.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Only notifications addressed to this PayPal account are accepted.
    pub business_email: String,
    /// Refund accepted payments instead of applying them (test shops).
    pub auto_refund: bool,
}

/// Command to handle one notification.
#[derive(Debug, Clone)]
pub struct HandleNotificationCommand {
    /// Form body exactly as PayPal posted it.
    pub raw_body: Vec<u8>,
}

/// Outcome of a notification. The endpoint acknowledges all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleNotificationResult {
    /// Changes were committed.
    Applied {
        kind: NotificationKind,
        purchase_id: PurchaseId,
    },
    /// The payment was refunded instead of applied.
    AutoRefunded { purchase_id: PurchaseId },
    /// Already processed.
    Duplicate,
    /// Nothing to do for this notification.
    Ignored { reason: String },
    /// Failed a check; nothing was written.
    Rejected { reason: String },
}

enum Callback {
    Payment(Purchase, Payment),
    SubscriptionCreated(Purchase, String),
    SubscriptionCanceled(Purchase),
}

/// Work deferred until the transaction commits.
#[derive(Default)]
struct FollowUps {
    emails: Vec<OutgoingEmail>,
    callbacks: Vec<Callback>,
    upgrade: Option<PurchaseId>,
}

enum Dispatched {
    Applied(FollowUps),
    AutoRefunded,
}

/// Handler for PayPal notifications.
pub struct HandleNotificationHandler {
    store: Arc<dyn PurchaseStore>,
    verifier: Arc<dyn NotificationVerifier>,
    processor: Arc<dyn ProcessorClient>,
    callback: Arc<dyn PaymentCallback>,
    lifecycle: Arc<SubscriptionLifecycle>,
    clock: Arc<dyn Clock>,
    tokens: TokenCodec,
    settings: NotificationSettings,
}

impl HandleNotificationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        verifier: Arc<dyn NotificationVerifier>,
        processor: Arc<dyn ProcessorClient>,
        callback: Arc<dyn PaymentCallback>,
        lifecycle: Arc<SubscriptionLifecycle>,
        clock: Arc<dyn Clock>,
        tokens: TokenCodec,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            verifier,
            processor,
            callback,
            lifecycle,
            clock,
            tokens,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleNotificationCommand,
    ) -> Result<HandleNotificationResult, BillingError> {
        // 1. Parse and check where it came from
        let notification = match Notification::from_form(&cmd.raw_body) {
            Ok(notification) => notification,
            Err(e) => return Ok(rejected(e.to_string())),
        };

        if notification.receiver_email() != Some(self.settings.business_email.as_str()) {
            return Ok(rejected(format!(
                "wrong receiver email {:?}",
                notification.receiver_email()
            )));
        }

        if self.verifier.verify(&cmd.raw_body).await? != Verification::Verified {
            return Ok(rejected("PayPal verification not passed"));
        }

        // 2. Find the transaction it belongs to
        let transaction_id = match notification
            .custom()
            .map_err(BillingError::from)
            .and_then(|custom| self.tokens.decode(custom))
        {
            Ok(id) => id,
            Err(e) => return Ok(rejected(format!("wrong 'custom' field: {}", e))),
        };

        // 3. Classify
        let kind = match notification.classify() {
            Ok(Classification::Act(kind)) => kind,
            Ok(Classification::Ignore { kind }) => {
                tracing::debug!(
                    kind = kind.as_str(),
                    payment_status = ?notification.get("payment_status"),
                    "Payment not completed"
                );
                return Ok(HandleNotificationResult::Ignored {
                    reason: format!("{} not completed", kind.as_str()),
                });
            }
            Err(e) => {
                tracing::info!(transaction_id = %transaction_id, reason = %e, "Notification ignored");
                return Ok(HandleNotificationResult::Ignored {
                    reason: e.to_string(),
                });
            }
        };

        // 4. Apply atomically
        let mut tx = self.store.begin().await?;
        let outcome = self
            .apply(&mut *tx, &notification, kind, transaction_id)
            .await;

        match outcome {
            Ok((purchase_id, Dispatched::Applied(follow_ups))) => {
                tx.commit().await?;
                tracing::info!(
                    transaction_id = %transaction_id,
                    purchase_id = %purchase_id,
                    kind = kind.as_str(),
                    "Notification applied"
                );
                self.run_follow_ups(follow_ups).await;
                Ok(HandleNotificationResult::Applied { kind, purchase_id })
            }
            Ok((purchase_id, Dispatched::AutoRefunded)) => {
                tx.commit().await?;
                Ok(HandleNotificationResult::AutoRefunded { purchase_id })
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Rollback failed");
                }
                classify_failure(e, transaction_id, kind)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        kind: NotificationKind,
        transaction_id: TransactionId,
    ) -> Result<(PurchaseId, Dispatched), BillingError> {
        let transaction = tx
            .find_transaction(transaction_id)
            .await?
            .ok_or(BillingError::TransactionNotFound(transaction_id))?;
        let mut purchase = tx
            .lock_purchase(transaction.purchase_id)
            .await?
            .ok_or(BillingError::PurchaseNotFound(transaction.purchase_id))?;

        verify_amounts(kind, notification, &purchase)?;

        match notification.ledger_key() {
            Some(key) => {
                let record = NotificationRecord {
                    key: key.clone(),
                    kind: kind.as_str().to_string(),
                    transaction_id,
                    processed_at: self.clock.now(),
                };
                if tx.record_notification(record).await? == SaveResult::AlreadyExists {
                    return Err(BillingError::DuplicateNotification(key));
                }
            }
            None => tracing::debug!(transaction_id = %transaction_id, "Notification has no ledger key"),
        }

        if kind.is_payment() && self.settings.auto_refund {
            self.auto_refund(notification, &purchase).await?;
            return Ok((purchase.id, Dispatched::AutoRefunded));
        }

        let follow_ups = match kind {
            NotificationKind::RegularPayment => {
                self.accept_regular_payment(tx, notification, &transaction, &mut purchase)
                    .await?
            }
            NotificationKind::RecurringPayment | NotificationKind::SubscriptionPayment => {
                self.accept_recurring_payment(tx, notification, kind, &transaction, &mut purchase)
                    .await?
            }
            NotificationKind::RecurringSignup | NotificationKind::SubscriptionSignup => {
                self.accept_signup(tx, notification, kind, &transaction, &mut purchase)
                    .await?
            }
            NotificationKind::RecurringCanceled | NotificationKind::SubscriptionCanceled => {
                self.accept_cancel(tx, notification, kind, &mut purchase).await?
            }
            NotificationKind::Refund => {
                self.lifecycle.refund_payment(tx, &mut purchase).await?;
                FollowUps::default()
            }
        };
        Ok((purchase.id, Dispatched::Applied(follow_ups)))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ════════════════════════════════════════════════════════════════════════════

    async fn accept_regular_payment(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        transaction: &Transaction,
        purchase: &mut Purchase,
    ) -> Result<FollowUps, BillingError> {
        let payer = notification.payer_email().map(str::to_string);
        let payment = tx
            .insert_payment(NewPayment::simple(transaction.id, self.clock.now(), payer.clone()))
            .await?;

        purchase.accept_regular_payment(payment.id)?;
        if let (Some(details), Some(email)) = (purchase.subscription_mut(), payer) {
            details.email = Some(email);
        }
        tx.save_purchase(purchase).await?;
        self.lifecycle.advance_parent(tx, purchase).await?;

        Ok(FollowUps {
            upgrade: purchase.old_subscription_id.map(|_| purchase.id),
            callbacks: vec![Callback::Payment(purchase.clone(), payment)],
            ..FollowUps::default()
        })
    }

    async fn accept_recurring_payment(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        kind: NotificationKind,
        transaction: &Transaction,
        purchase: &mut Purchase,
    ) -> Result<FollowUps, BillingError> {
        let reference = notification.agreement_reference(kind)?;
        let (payment, _) = self
            .obtain_active_subscription(tx, notification, transaction, purchase, reference)
            .await?;

        let steps = purchase.advance_on_payment(self.clock.today())?;
        tx.save_purchase(purchase).await?;
        if steps > 0 {
            tx.reset_reminders(purchase.id).await?;
        }

        tracing::debug!(
            purchase_id = %purchase.id,
            periods = steps,
            due_payment_date = ?purchase.subscription().map(|d| d.due_payment_date),
            "Subscription advanced"
        );

        Ok(FollowUps {
            callbacks: vec![Callback::Payment(purchase.clone(), payment)],
            ..FollowUps::default()
        })
    }

    async fn accept_signup(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        kind: NotificationKind,
        transaction: &Transaction,
        purchase: &mut Purchase,
    ) -> Result<FollowUps, BillingError> {
        let reference = notification.agreement_reference(kind)?;
        let (_, activation) = self
            .obtain_active_subscription(tx, notification, transaction, purchase, reference)
            .await?;
        if activation == Activation::Activated {
            tx.save_purchase(purchase).await?;
        }

        Ok(FollowUps {
            upgrade: purchase.old_subscription_id.map(|_| purchase.id),
            callbacks: vec![Callback::SubscriptionCreated(
                purchase.clone(),
                reference.to_string(),
            )],
            ..FollowUps::default()
        })
    }

    async fn accept_cancel(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        kind: NotificationKind,
        purchase: &mut Purchase,
    ) -> Result<FollowUps, BillingError> {
        let reference = notification.agreement_reference(kind)?;
        let current = purchase
            .subscription()
            .ok_or(BillingError::NotASubscription(purchase.id))?
            .subscription_reference
            .clone();
        if current.as_deref().map_or(false, |current| current != reference) {
            tracing::info!(
                purchase_id = %purchase.id,
                agreement = %reference,
                "Cancel for an agreement that was already replaced"
            );
            return Ok(FollowUps::default());
        }

        let email = self.lifecycle.cancel_subscription(tx, purchase).await?;
        Ok(FollowUps {
            emails: email.into_iter().collect(),
            callbacks: vec![Callback::SubscriptionCanceled(purchase.clone())],
            ..FollowUps::default()
        })
    }

    /// Reuses the automatic payment recorded for `(processor, reference)` or
    /// creates it, then records the agreement on the purchase.
    async fn obtain_active_subscription(
        &self,
        tx: &mut dyn PurchaseTransaction,
        notification: &Notification,
        transaction: &Transaction,
        purchase: &mut Purchase,
        reference: &str,
    ) -> Result<(Payment, Activation), BillingError> {
        let payer = notification.payer_email();
        let payment = match tx
            .find_automatic_payment(transaction.processor, reference)
            .await?
        {
            Some(payment) => payment,
            None => {
                tx.insert_payment(NewPayment::automatic(
                    transaction.id,
                    self.clock.now(),
                    payer.map(str::to_string),
                    transaction.processor,
                    reference,
                ))
                .await?
            }
        };

        let activation =
            purchase.activate_subscription(transaction.processor, reference, payer, payment.id)?;
        Ok((payment, activation))
    }

    /// Refunds the payment minus PayPal's fee.
    async fn auto_refund(
        &self,
        notification: &Notification,
        purchase: &Purchase,
    ) -> Result<(), BillingError> {
        let txn_id = notification.txn_id().ok_or(BillingError::MissingField("txn_id"))?;
        let amount = auto_refund_amount(purchase.price());

        if let Err(e) = self
            .processor
            .refund(txn_id, amount, &purchase.item.currency)
            .await
        {
            tracing::error!(purchase_id = %purchase.id, txn_id = %txn_id, error = %e, "Auto-refund failed");
            return Err(e.into());
        }

        tracing::info!(purchase_id = %purchase.id, txn_id = %txn_id, amount = ?amount, "Payment auto-refunded");
        Ok(())
    }

    async fn run_follow_ups(&self, follow_ups: FollowUps) {
        if let Some(purchase_id) = follow_ups.upgrade {
            if let Err(e) = self.lifecycle.upgrade_subscription(purchase_id).await {
                tracing::error!(purchase_id = %purchase_id, error = %e, "Upgrade failed");
            }
        }

        for callback in follow_ups.callbacks {
            match callback {
                Callback::Payment(purchase, payment) => {
                    self.callback.on_payment(&purchase, &payment).await
                }
                Callback::SubscriptionCreated(purchase, reference) => {
                    self.callback
                        .on_subscription_created(&purchase, &reference)
                        .await
                }
                Callback::SubscriptionCanceled(purchase) => {
                    self.callback.on_subscription_canceled(&purchase).await
                }
            }
        }

        self.lifecycle.send_emails(follow_ups.emails).await;
    }
}

/// Price minus the fee, in cents. `None` (a full refund) when nothing would
/// be left.
fn auto_refund_amount(price: Decimal) -> Option<Decimal> {
    let amount = (price - AUTO_REFUND_FEE).round_dp(2);
    (amount > Decimal::ZERO).then_some(amount)
}

fn rejected(reason: impl Into<String>) -> HandleNotificationResult {
    let reason = reason.into();
    tracing::warn!(reason = %reason, "Notification rejected");
    HandleNotificationResult::Rejected { reason }
}

fn classify_failure(
    error: BillingError,
    transaction_id: TransactionId,
    kind: NotificationKind,
) -> Result<HandleNotificationResult, BillingError> {
    match error {
        BillingError::DuplicateNotification(key) => {
            tracing::info!(transaction_id = %transaction_id, key = %key, "Duplicate notification");
            Ok(HandleNotificationResult::Duplicate)
        }
        e if e.is_rejection() => Ok(rejected(format!("{} for transaction {}: {}", kind.as_str(), transaction_id, e))),
        e @ (BillingError::TransactionNotFound(_)
        | BillingError::PurchaseNotFound(_)
        | BillingError::NotASubscription(_)
        | BillingError::InvalidTransition(_)) => Ok(rejected(e.to_string())),
        e => Err(e),
    }
}
