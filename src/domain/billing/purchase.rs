//! Purchase aggregate - one sold instance of an item and its billing state.
//!
//! A purchase is a closed set of variants sharing a common header:
//!
//! - `Simple`: a one-time sale with a payment status.
//! - `Subscription`: a recurring sale with due date, deadline and lifecycle.
//! - `Prolong`: a one-time sale that extends a subscription by a period.
//! - `Aggregate`: a one-time sale whose totals are the sum of its children.
//!
//! Purchases are financial history and are never deleted, only blocked,
//! refunded or canceled.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, PurchaseId, StateMachine, ValidationError};

use super::errors::BillingError;
use super::item::{Item, SubscriptionTerms};
use super::payment::Processor;
use super::period::Period;

/// Highest value of `reminders_sent`.
pub const MAX_REMINDER_LEVEL: i16 = 3;

/// Manual renewal may start at most this many days before the due date.
const SUBSCRIPTION_LEAD_DAYS: i64 = 89;

/// Payment status of the one-time variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotPaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "not_paid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "not_paid" => Ok(PaymentStatus::NotPaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Lifecycle of a subscription purchase.
///
/// `Blocked` is never stored: it is reported whenever the purchase's
/// `blocked` flag is set and overrides the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Nothing paid and no recurring agreement.
    Unpaid,
    /// Free trial running.
    Trial,
    /// Paid by one-time payments; renewed by prolong purchases.
    ActiveManual,
    /// Recurring agreement in place; renewed by each charge.
    ActiveAutomatic,
    /// Administratively blocked.
    Blocked,
    /// Agreement canceled; the due date is frozen.
    Canceled,
}

impl SubscriptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Unpaid => "unpaid",
            SubscriptionState::Trial => "trial",
            SubscriptionState::ActiveManual => "active_manual",
            SubscriptionState::ActiveAutomatic => "active_automatic",
            SubscriptionState::Blocked => "blocked",
            SubscriptionState::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "unpaid" => Ok(SubscriptionState::Unpaid),
            "trial" => Ok(SubscriptionState::Trial),
            "active_manual" => Ok(SubscriptionState::ActiveManual),
            "active_automatic" => Ok(SubscriptionState::ActiveAutomatic),
            "blocked" => Ok(SubscriptionState::Blocked),
            "canceled" => Ok(SubscriptionState::Canceled),
            other => Err(ValidationError::invalid_format(
                "subscription_state",
                format!("unknown state '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionState::*;
        match self {
            Unpaid => vec![Unpaid, Trial, ActiveManual, ActiveAutomatic, Canceled, Blocked],
            Trial => vec![Trial, ActiveManual, ActiveAutomatic, Canceled, Blocked],
            ActiveManual => vec![ActiveManual, ActiveAutomatic, Unpaid, Canceled, Blocked],
            ActiveAutomatic => vec![ActiveAutomatic, Unpaid, Canceled, Blocked],
            Canceled => vec![Canceled, Trial, ActiveManual, ActiveAutomatic, Blocked],
            Blocked => vec![Blocked, Unpaid, Trial, ActiveManual, ActiveAutomatic, Canceled],
        }
    }
}

/// One-time sale state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeDetails {
    pub status: PaymentStatus,
}

/// Recurring sale state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    pub state: SubscriptionState,
    pub due_payment_date: NaiveDate,
    /// After this date the subscription is inactive.
    pub payment_deadline: Option<NaiveDate>,
    /// Billing cycle sequence used in invoice ids; starts at 1.
    pub subinvoice: i32,
    /// Processor-assigned agreement id (`subscr_id` / `recurring_payment_id`).
    pub subscription_reference: Option<String>,
    pub processor: Option<Processor>,
    pub email: Option<String>,
}

impl SubscriptionDetails {
    pub fn new(due_payment_date: NaiveDate) -> Self {
        Self {
            state: SubscriptionState::Unpaid,
            due_payment_date,
            payment_deadline: None,
            subinvoice: 1,
            subscription_reference: None,
            processor: None,
            email: None,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.state == SubscriptionState::Trial
    }

    /// True when renewals are automatic.
    pub fn is_subscribed(&self) -> bool {
        self.subscription_reference.is_some()
    }
}

/// Prolongation of a manually renewed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProlongDetails {
    pub status: PaymentStatus,
    pub prolonged_id: PurchaseId,
    pub period: Period,
}

/// Bundle of child purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDetails {
    pub status: PaymentStatus,
    /// Sum of the children's prices, maintained by `calc`.
    pub price: Decimal,
}

/// Variant-specific part of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum PurchaseDetails {
    Simple(OneTimeDetails),
    Subscription(SubscriptionDetails),
    Prolong(ProlongDetails),
    Aggregate(AggregateDetails),
}

impl PurchaseDetails {
    pub fn variant_name(&self) -> &'static str {
        match self {
            PurchaseDetails::Simple(_) => "simple",
            PurchaseDetails::Subscription(_) => "subscription",
            PurchaseDetails::Prolong(_) => "prolong",
            PurchaseDetails::Aggregate(_) => "aggregate",
        }
    }
}

/// A purchase with its common header and variant details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub item: Item,
    /// Aggregate purchase this one belongs to.
    pub parent_id: Option<PurchaseId>,
    pub payment_id: Option<PaymentId>,
    /// Fraud or misbehaviour detected; overrides every other state.
    pub blocked: bool,
    /// Provided for free.
    pub gratis: bool,
    pub shipping: Decimal,
    pub tax: Decimal,
    /// Highest reminder level already sent (0..=3).
    pub reminders_sent: i16,
    /// Subscription purchase this one replaces (plan upgrade).
    pub old_subscription_id: Option<PurchaseId>,
    pub created_at: DateTime<Utc>,
    pub details: PurchaseDetails,
}

impl Purchase {
    fn with_details(
        id: PurchaseId,
        item: Item,
        details: PurchaseDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            item,
            parent_id: None,
            payment_id: None,
            blocked: false,
            gratis: false,
            shipping: Decimal::ZERO,
            tax: Decimal::ZERO,
            reminders_sent: 0,
            old_subscription_id: None,
            created_at,
            details,
        }
    }

    /// Creates an unpaid one-time purchase.
    pub fn simple(id: PurchaseId, item: Item, created_at: DateTime<Utc>) -> Self {
        Self::with_details(
            id,
            item,
            PurchaseDetails::Simple(OneTimeDetails {
                status: PaymentStatus::NotPaid,
            }),
            created_at,
        )
    }

    /// Creates an unpaid subscription due on `due_payment_date`.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the item is not a recurring item.
    pub fn new_subscription(
        id: PurchaseId,
        item: Item,
        due_payment_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BillingError> {
        if !item.is_subscription() {
            return Err(ValidationError::invalid_format(
                "item",
                "subscription purchases need a recurring item",
            )
            .into());
        }
        Ok(Self::with_details(
            id,
            item,
            PurchaseDetails::Subscription(SubscriptionDetails::new(due_payment_date)),
            created_at,
        ))
    }

    /// Creates an unpaid purchase that prolongs `prolonged_id` by `period`.
    pub fn prolong(
        id: PurchaseId,
        item: Item,
        prolonged_id: PurchaseId,
        period: Period,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::with_details(
            id,
            item,
            PurchaseDetails::Prolong(ProlongDetails {
                status: PaymentStatus::NotPaid,
                prolonged_id,
                period,
            }),
            created_at,
        )
    }

    /// Creates an empty aggregate; call `calc` once children are attached.
    pub fn aggregate(id: PurchaseId, item: Item, created_at: DateTime<Utc>) -> Self {
        Self::with_details(
            id,
            item,
            PurchaseDetails::Aggregate(AggregateDetails {
                status: PaymentStatus::NotPaid,
                price: Decimal::ZERO,
            }),
            created_at,
        )
    }

    pub fn with_shipping(mut self, shipping: Decimal) -> Self {
        self.shipping = shipping;
        self
    }

    pub fn with_tax(mut self, tax: Decimal) -> Self {
        self.tax = tax;
        self
    }

    pub fn with_parent(mut self, parent_id: PurchaseId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn replacing(mut self, old_subscription_id: PurchaseId) -> Self {
        self.old_subscription_id = Some(old_subscription_id);
        self
    }

    /// Price of one charge. Aggregates report the sum of their children.
    pub fn price(&self) -> Decimal {
        match &self.details {
            PurchaseDetails::Aggregate(aggregate) => aggregate.price,
            _ => self.item.price,
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self.details, PurchaseDetails::Subscription(_))
    }

    pub fn subscription(&self) -> Option<&SubscriptionDetails> {
        match &self.details {
            PurchaseDetails::Subscription(details) => Some(details),
            _ => None,
        }
    }

    pub fn subscription_mut(&mut self) -> Option<&mut SubscriptionDetails> {
        match &mut self.details {
            PurchaseDetails::Subscription(details) => Some(details),
            _ => None,
        }
    }

    /// Subscription details and item terms, or `NotASubscription`.
    pub(crate) fn subscription_parts_mut(
        &mut self,
    ) -> Result<(SubscriptionTerms, &mut SubscriptionDetails), BillingError> {
        let id = self.id;
        let terms = self.item.terms().copied();
        match (terms, &mut self.details) {
            (Some(terms), PurchaseDetails::Subscription(details)) => Ok((terms, details)),
            _ => Err(BillingError::NotASubscription(id)),
        }
    }

    pub fn prolongation(&self) -> Option<&ProlongDetails> {
        match &self.details {
            PurchaseDetails::Prolong(details) => Some(details),
            _ => None,
        }
    }

    /// Payment status of one-time variants; `None` for subscriptions.
    pub fn status(&self) -> Option<PaymentStatus> {
        match &self.details {
            PurchaseDetails::Simple(d) => Some(d.status),
            PurchaseDetails::Prolong(d) => Some(d.status),
            PurchaseDetails::Aggregate(d) => Some(d.status),
            PurchaseDetails::Subscription(_) => None,
        }
    }

    pub(crate) fn status_mut(&mut self) -> Option<&mut PaymentStatus> {
        match &mut self.details {
            PurchaseDetails::Simple(d) => Some(&mut d.status),
            PurchaseDetails::Prolong(d) => Some(&mut d.status),
            PurchaseDetails::Aggregate(d) => Some(&mut d.status),
            PurchaseDetails::Subscription(_) => None,
        }
    }

    /// Effective lifecycle state; `Blocked` overrides the stored state.
    pub fn subscription_state(&self) -> Option<SubscriptionState> {
        let details = self.subscription()?;
        if self.blocked {
            Some(SubscriptionState::Blocked)
        } else {
            Some(details.state)
        }
    }

    pub fn is_trial(&self) -> bool {
        self.subscription().map_or(false, SubscriptionDetails::is_trial)
    }

    /// Paid on time (or gratis) and not blocked.
    ///
    /// Always false for non-subscription purchases.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        let Some(details) = self.subscription() else {
            return false;
        };
        let on_time = details.payment_deadline.map_or(false, |deadline| today <= deadline);
        (on_time || self.gratis) && !self.blocked
    }

    /// First date a manual renewal may be turned into an automatic one.
    pub fn subscription_allowed_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        let details = self.subscription()?;
        let earliest = details.due_payment_date - Duration::days(SUBSCRIPTION_LEAD_DAYS);
        Some(today.max(earliest))
    }

    pub fn ready_for_subscription(&self, today: NaiveDate) -> bool {
        self.subscription_allowed_date(today)
            .map_or(false, |allowed| today >= allowed)
    }
}
