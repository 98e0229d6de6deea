//! Subscription lifecycle operations on a loaded purchase.
//!
//! These are the pure halves of the lifecycle: they mutate an in-memory
//! purchase and validate the state move. Anything that touches storage or the
//! processor (row locks, counter bumps, remote cancel) lives in
//! `application::lifecycle`, which calls into these.
//!
//! Every due-date change funnels through [`Purchase::set_payment_date`] so that
//! `payment_deadline = due_payment_date + grace_period` always holds.

use chrono::NaiveDate;

use crate::domain::foundation::{PaymentId, StateMachine};

use super::date_offset::offset_date;
use super::errors::BillingError;
use super::payment::Processor;
use super::period::Period;
use super::purchase::{PaymentStatus, Purchase, SubscriptionDetails, SubscriptionState};

/// Result of [`Purchase::activate_subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The same agreement was already recorded; nothing changed.
    AlreadyActive,
    /// The agreement was recorded.
    Activated,
}

/// What [`Purchase::mark_canceled`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelNotice {
    pub was_already_canceled: bool,
    pub replaces_old_subscription: bool,
}

impl CancelNotice {
    /// The customer is told once, and not when a plan upgrade replaced the
    /// agreement.
    pub fn should_notify(&self) -> bool {
        !self.was_already_canceled && !self.replaces_old_subscription
    }
}

fn move_state(details: &mut SubscriptionDetails, target: SubscriptionState) -> Result<(), BillingError> {
    details.state = details
        .state
        .transition_to(target)
        .map_err(|e| BillingError::InvalidTransition(e.to_string()))?;
    Ok(())
}

impl Purchase {
    /// Sets the due date and recomputes the deadline from the grace period.
    ///
    /// # Errors
    ///
    /// `NotASubscription` for other purchase kinds.
    pub fn set_payment_date(&mut self, date: NaiveDate) -> Result<(), BillingError> {
        let (terms, details) = self.subscription_parts_mut()?;
        details.due_payment_date = date;
        details.payment_deadline = Some(offset_date(date, terms.grace_period));
        Ok(())
    }

    /// Starts the free trial.
    ///
    /// Does nothing and returns `false` when the item has no trial period.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the subscription is already paid.
    pub fn start_trial(&mut self, today: NaiveDate) -> Result<bool, BillingError> {
        let (terms, details) = self.subscription_parts_mut()?;
        if terms.trial_period.is_zero() {
            return Ok(false);
        }
        move_state(details, SubscriptionState::Trial)?;
        self.set_payment_date(offset_date(today, terms.trial_period))?;
        Ok(true)
    }

    /// True if `reference` from `processor` is the agreement currently on
    /// this purchase.
    pub fn has_active_agreement(&self, processor: Processor, reference: &str) -> bool {
        self.subscription().map_or(false, |details| {
            details.state == SubscriptionState::ActiveAutomatic
                && details.processor == Some(processor)
                && details.subscription_reference.as_deref() == Some(reference)
                && self.payment_id.is_some()
        })
    }

    /// Records a recurring agreement and the payment that carries it.
    ///
    /// Repeated deliveries of the same agreement leave the purchase untouched.
    pub fn activate_subscription(
        &mut self,
        processor: Processor,
        reference: &str,
        email: Option<&str>,
        payment_id: PaymentId,
    ) -> Result<Activation, BillingError> {
        if self.has_active_agreement(processor, reference) {
            return Ok(Activation::AlreadyActive);
        }
        let (_, details) = self.subscription_parts_mut()?;
        move_state(details, SubscriptionState::ActiveAutomatic)?;
        details.subscription_reference = Some(reference.to_string());
        details.processor = Some(processor);
        if let Some(email) = email {
            details.email = Some(email.to_string());
        }
        self.payment_id = Some(payment_id);
        Ok(Activation::Activated)
    }

    /// Moves the due date past `today` after an accepted recurring charge.
    ///
    /// Leaves the trial. Each step resets `reminders_sent`. A zero payment
    /// period performs no steps. Returns the number of periods advanced.
    pub fn advance_on_payment(&mut self, today: NaiveDate) -> Result<u32, BillingError> {
        let (terms, details) = self.subscription_parts_mut()?;
        if details.state == SubscriptionState::Trial {
            let target = if details.is_subscribed() {
                SubscriptionState::ActiveAutomatic
            } else {
                SubscriptionState::ActiveManual
            };
            move_state(details, target)?;
        }

        let period = terms.payment_period;
        if period.count <= 0 {
            return Ok(0);
        }

        let mut date = details.due_payment_date;
        let mut steps = 0;
        while date <= today {
            date = offset_date(date, period);
            self.set_payment_date(date)?;
            self.reminders_sent = 0;
            steps += 1;
        }
        Ok(steps)
    }

    /// Applies a one-time payment to this purchase.
    ///
    /// One-time variants become `Paid`; a subscription paid by hand becomes
    /// `ActiveManual` unless an agreement is already running.
    pub fn accept_regular_payment(&mut self, payment_id: PaymentId) -> Result<(), BillingError> {
        if let Some(status) = self.status_mut() {
            *status = PaymentStatus::Paid;
        } else {
            let (_, details) = self.subscription_parts_mut()?;
            if details.state != SubscriptionState::ActiveAutomatic {
                move_state(details, SubscriptionState::ActiveManual)?;
            }
        }
        self.payment_id = Some(payment_id);
        Ok(())
    }

    /// Drops the agreement locally and enters `Canceled`.
    ///
    /// The subinvoice bump is done by storage so concurrent writers cannot
    /// lose an increment; see `PurchaseTransaction::increment_subinvoice`.
    pub fn mark_canceled(&mut self) -> Result<CancelNotice, BillingError> {
        let replaces_old_subscription = self.old_subscription_id.is_some();
        let (_, details) = self.subscription_parts_mut()?;
        let was_already_canceled = details.state == SubscriptionState::Canceled;

        move_state(details, SubscriptionState::Canceled)?;
        details.subscription_reference = None;
        details.processor = None;
        self.payment_id = None;

        Ok(CancelNotice {
            was_already_canceled,
            replaces_old_subscription,
        })
    }

    /// Stores the subinvoice value returned by an atomic increment.
    pub fn apply_subinvoice(&mut self, subinvoice: i32) -> Result<(), BillingError> {
        let (_, details) = self.subscription_parts_mut()?;
        details.subinvoice = subinvoice.max(details.subinvoice);
        Ok(())
    }

    /// Reverses the payment on this purchase after a refund.
    ///
    /// One-time variants become `Refunded`. A subscription loses its payment
    /// and agreement and goes back to `Unpaid` (a trial or a canceled
    /// subscription keeps its state).
    pub fn clear_payment(&mut self) -> Result<(), BillingError> {
        self.payment_id = None;
        if let Some(status) = self.status_mut() {
            *status = PaymentStatus::Refunded;
            return Ok(());
        }
        let (_, details) = self.subscription_parts_mut()?;
        details.subscription_reference = None;
        details.processor = None;
        if matches!(
            details.state,
            SubscriptionState::ActiveManual | SubscriptionState::ActiveAutomatic
        ) {
            move_state(details, SubscriptionState::Unpaid)?;
        }
        Ok(())
    }

    /// Extends the due date by `period`, counting from today when the
    /// subscription has already lapsed.
    pub fn prolong_by(&mut self, period: Period, today: NaiveDate) -> Result<NaiveDate, BillingError> {
        let due = self
            .subscription()
            .ok_or(BillingError::NotASubscription(self.id))?
            .due_payment_date;
        let next = offset_date(today.max(due), period);
        self.set_payment_date(next)?;
        Ok(next)
    }

    /// Takes back an extension granted by [`Purchase::prolong_by`].
    pub fn retract_prolongation(&mut self, period: Period) -> Result<NaiveDate, BillingError> {
        let due = self
            .subscription()
            .ok_or(BillingError::NotASubscription(self.id))?
            .due_payment_date;
        let previous = offset_date(due, period.negated());
        self.set_payment_date(previous)?;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::item::SubscriptionTerms;
    use crate::domain::billing::purchase::fixtures::*;
    use rust_decimal::Decimal;

    fn with_terms(mut purchase: Purchase, terms: SubscriptionTerms) -> Purchase {
        purchase.item.kind = crate::domain::billing::item::ItemKind::Subscription(terms);
        purchase
    }

    fn details(purchase: &Purchase) -> &SubscriptionDetails {
        purchase.subscription().unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Dates
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn set_payment_date_recomputes_deadline_from_grace() {
        let mut purchase = subscription(1, date(2024, 1, 1));
        purchase.set_payment_date(date(2024, 2, 10)).unwrap();

        assert_eq!(details(&purchase).due_payment_date, date(2024, 2, 10));
        assert_eq!(details(&purchase).payment_deadline, Some(date(2024, 3, 1)));
    }

    #[test]
    fn set_payment_date_rejects_one_time_purchase() {
        let mut purchase = simple(1, Decimal::ONE);
        assert!(matches!(
            purchase.set_payment_date(date(2024, 1, 1)),
            Err(BillingError::NotASubscription(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Trial
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn start_trial_with_zero_period_changes_nothing() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        let before = purchase.clone();

        assert!(!purchase.start_trial(date(2024, 1, 5)).unwrap());
        assert!(!purchase.is_trial());
        assert_eq!(purchase, before);
    }

    #[test]
    fn start_trial_sets_due_date_after_trial_period() {
        let terms = SubscriptionTerms {
            trial_period: Period::days(14),
            ..SubscriptionTerms::default()
        };
        let mut purchase = with_terms(subscription(1, date(2024, 1, 1)), terms);

        assert!(purchase.start_trial(date(2024, 1, 5)).unwrap());
        assert!(purchase.is_trial());
        assert_eq!(details(&purchase).due_payment_date, date(2024, 1, 19));
        assert_eq!(details(&purchase).payment_deadline, Some(date(2024, 2, 8)));
    }

    #[test]
    fn start_trial_on_paid_subscription_is_rejected() {
        let terms = SubscriptionTerms {
            trial_period: Period::days(14),
            ..SubscriptionTerms::default()
        };
        let mut purchase = with_terms(subscription(1, date(2024, 1, 1)), terms);
        purchase
            .activate_subscription(Processor::PayPal, "I-1", None, PaymentId::new(1))
            .unwrap();

        assert!(matches!(
            purchase.start_trial(date(2024, 1, 5)),
            Err(BillingError::InvalidTransition(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Activation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn activation_records_agreement() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        let result = purchase
            .activate_subscription(Processor::PayPal, "I-1", Some("a@example.com"), PaymentId::new(3))
            .unwrap();

        assert_eq!(result, Activation::Activated);
        assert_eq!(details(&purchase).state, SubscriptionState::ActiveAutomatic);
        assert_eq!(details(&purchase).subscription_reference.as_deref(), Some("I-1"));
        assert_eq!(details(&purchase).email.as_deref(), Some("a@example.com"));
        assert_eq!(purchase.payment_id, Some(PaymentId::new(3)));
    }

    #[test]
    fn second_activation_with_same_reference_changes_nothing() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        purchase
            .activate_subscription(Processor::PayPal, "I-1", Some("a@example.com"), PaymentId::new(3))
            .unwrap();
        let after_first = purchase.clone();

        let result = purchase
            .activate_subscription(Processor::PayPal, "I-1", Some("b@example.com"), PaymentId::new(4))
            .unwrap();

        assert_eq!(result, Activation::AlreadyActive);
        assert_eq!(purchase, after_first);
    }

    // ══════════════════════════════════════════════════════════════
    // Advancing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn payment_advances_january_31_to_march_2() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        purchase.reminders_sent = 2;
        purchase
            .activate_subscription(Processor::PayPal, "I-1", None, PaymentId::new(1))
            .unwrap();

        let steps = purchase.advance_on_payment(date(2024, 2, 15)).unwrap();

        assert_eq!(steps, 1);
        assert_eq!(details(&purchase).due_payment_date, date(2024, 3, 2));
        assert_eq!(purchase.reminders_sent, 0);
    }

    #[test]
    fn payment_advances_until_strictly_after_today() {
        let mut purchase = subscription(1, date(2024, 1, 10));
        let steps = purchase.advance_on_payment(date(2024, 3, 10)).unwrap();

        assert_eq!(steps, 3);
        assert_eq!(details(&purchase).due_payment_date, date(2024, 4, 10));
    }

    #[test]
    fn future_due_date_is_not_advanced() {
        let mut purchase = subscription(1, date(2024, 5, 1));
        purchase.reminders_sent = 1;

        assert_eq!(purchase.advance_on_payment(date(2024, 4, 1)).unwrap(), 0);
        assert_eq!(details(&purchase).due_payment_date, date(2024, 5, 1));
        assert_eq!(purchase.reminders_sent, 1);
    }

    #[test]
    fn zero_payment_period_skips_advancing() {
        let terms = SubscriptionTerms {
            payment_period: Period::months(0),
            ..SubscriptionTerms::default()
        };
        let mut purchase = with_terms(subscription(1, date(2024, 1, 1)), terms);

        assert_eq!(purchase.advance_on_payment(date(2024, 6, 1)).unwrap(), 0);
        assert_eq!(details(&purchase).due_payment_date, date(2024, 1, 1));
    }

    #[test]
    fn advancing_leaves_trial() {
        let terms = SubscriptionTerms {
            trial_period: Period::days(7),
            ..SubscriptionTerms::default()
        };
        let mut purchase = with_terms(subscription(1, date(2024, 1, 1)), terms);
        purchase.start_trial(date(2024, 1, 1)).unwrap();

        purchase.advance_on_payment(date(2024, 1, 2)).unwrap();

        assert!(!purchase.is_trial());
        assert_eq!(details(&purchase).state, SubscriptionState::ActiveManual);
    }

    // ══════════════════════════════════════════════════════════════
    // Cancel and refund
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn cancel_clears_agreement_and_notifies_once() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        purchase
            .activate_subscription(Processor::PayPal, "I-1", None, PaymentId::new(1))
            .unwrap();

        let first = purchase.mark_canceled().unwrap();
        let second = purchase.mark_canceled().unwrap();

        assert!(first.should_notify());
        assert!(!second.should_notify());
        assert_eq!(details(&purchase).state, SubscriptionState::Canceled);
        assert!(details(&purchase).subscription_reference.is_none());
        assert!(purchase.payment_id.is_none());
    }

    #[test]
    fn cancel_of_replacing_subscription_is_silent() {
        let mut purchase = subscription(2, date(2024, 1, 31)).replacing(crate::domain::foundation::PurchaseId::new(1));
        assert!(!purchase.mark_canceled().unwrap().should_notify());
    }

    #[test]
    fn apply_subinvoice_never_goes_backwards() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        purchase.apply_subinvoice(3).unwrap();
        purchase.apply_subinvoice(2).unwrap();
        assert_eq!(details(&purchase).subinvoice, 3);
    }

    #[test]
    fn refund_on_automatic_subscription_returns_to_unpaid() {
        let mut purchase = subscription(1, date(2024, 1, 31));
        purchase
            .activate_subscription(Processor::PayPal, "I-1", None, PaymentId::new(1))
            .unwrap();

        purchase.clear_payment().unwrap();

        assert_eq!(details(&purchase).state, SubscriptionState::Unpaid);
        assert!(purchase.payment_id.is_none());
    }

    #[test]
    fn refund_on_one_time_purchase_marks_refunded() {
        let mut purchase = simple(1, Decimal::ONE);
        purchase.accept_regular_payment(PaymentId::new(1)).unwrap();
        assert_eq!(purchase.status(), Some(PaymentStatus::Paid));

        purchase.clear_payment().unwrap();
        assert_eq!(purchase.status(), Some(PaymentStatus::Refunded));
    }

    // ══════════════════════════════════════════════════════════════
    // Prolongation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn prolong_counts_from_due_date_when_still_running() {
        let mut purchase = subscription(1, date(2024, 3, 10));
        let next = purchase.prolong_by(Period::months(1), date(2024, 3, 1)).unwrap();
        assert_eq!(next, date(2024, 4, 10));
    }

    #[test]
    fn prolong_counts_from_today_when_lapsed() {
        let mut purchase = subscription(1, date(2024, 1, 10));
        let next = purchase.prolong_by(Period::days(30), date(2024, 3, 1)).unwrap();
        assert_eq!(next, date(2024, 3, 31));
    }

    #[test]
    fn retract_moves_due_date_back() {
        let mut purchase = subscription(1, date(2024, 4, 10));
        let previous = purchase.retract_prolongation(Period::months(1)).unwrap();
        assert_eq!(previous, date(2024, 3, 10));
        assert_eq!(details(&purchase).payment_deadline, Some(date(2024, 3, 30)));
    }
}
