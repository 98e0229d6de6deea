//! Checks a notification's money fields against the purchase it refers to.
//!
//! The purchase is authoritative: a notification whose amount, currency or
//! billing cycle differs is rejected before anything is written.

use rust_decimal::Decimal;

use crate::domain::billing::{BillingError, Purchase, SubscriptionTerms};

use super::notification::{Notification, NotificationKind};

fn expect_amount(field: &'static str, expected: Decimal, actual: Decimal) -> Result<(), BillingError> {
    if expected == actual {
        Ok(())
    } else {
        Err(BillingError::amount_mismatch(field, expected, actual))
    }
}

fn expect_currency(notification: &Notification, purchase: &Purchase) -> Result<(), BillingError> {
    let actual = notification.currency()?;
    let expected = purchase.item.currency.as_str();
    if actual == expected {
        Ok(())
    } else {
        Err(BillingError::text_mismatch("mc_currency", expected, actual))
    }
}

fn expect_absent(notification: &Notification, field: &'static str) -> Result<(), BillingError> {
    match notification.get(field) {
        None => Ok(()),
        Some(value) => Err(BillingError::text_mismatch(field, "<absent>", value)),
    }
}

fn terms(purchase: &Purchase) -> Result<SubscriptionTerms, BillingError> {
    purchase
        .item
        .terms()
        .copied()
        .ok_or(BillingError::NotASubscription(purchase.id))
}

/// `period3` (or `payment_cycle`) must be one of PayPal's spellings of the
/// payment period.
fn expect_cycle(field: &'static str, value: &str, terms: &SubscriptionTerms) -> Result<(), BillingError> {
    let cycles = terms.payment_period.payment_cycles();
    if cycles.iter().any(|cycle| cycle == value) {
        Ok(())
    } else {
        Err(BillingError::text_mismatch(field, cycles.join(" | "), value))
    }
}

/// Verifies amounts, currency and cycle of `notification` for `kind`.
///
/// # Errors
///
/// `AmountMismatch` on any difference, `MissingField` when a required field is
/// absent, `NotASubscription` for recurring kinds on one-time purchases.
pub fn verify_amounts(
    kind: NotificationKind,
    notification: &Notification,
    purchase: &Purchase,
) -> Result<(), BillingError> {
    let price = purchase.price();
    let shipping = purchase.shipping;

    match kind {
        NotificationKind::RegularPayment => {
            expect_amount("mc_gross", price, notification.decimal("mc_gross")?)?;
            expect_amount("shipping", shipping, notification.decimal("shipping")?)?;
            expect_currency(notification, purchase)?;
        }
        NotificationKind::RecurringPayment => {
            let terms = terms(purchase)?;
            expect_amount(
                "amount_per_cycle",
                price + shipping,
                notification.decimal("amount_per_cycle")?,
            )?;
            expect_cycle("payment_cycle", notification.require("payment_cycle")?, &terms)?;
            expect_currency(notification, purchase)?;
        }
        NotificationKind::SubscriptionPayment => {
            terms(purchase)?;
            expect_amount("mc_gross", price + shipping, notification.decimal("mc_gross")?)?;
            expect_currency(notification, purchase)?;
        }
        NotificationKind::RecurringSignup => {
            let terms = terms(purchase)?;
            expect_absent(notification, "period1")?;
            expect_absent(notification, "period2")?;
            expect_amount("mc_amount3", price + shipping, notification.decimal("mc_amount3")?)?;
            expect_currency(notification, purchase)?;
            expect_cycle("period3", notification.require("period3")?, &terms)?;
        }
        NotificationKind::SubscriptionSignup => {
            let terms = terms(purchase)?;
            if terms.trial_period.is_zero() {
                expect_absent(notification, "period1")?;
            } else {
                let expected = terms.trial_period.to_ipn();
                let actual = notification.require("period1")?;
                if actual != expected {
                    return Err(BillingError::text_mismatch("period1", expected, actual));
                }
            }
            expect_absent(notification, "period2")?;
            expect_amount("amount3", price + shipping, notification.decimal("amount3")?)?;
            let expected = terms.payment_period.to_ipn();
            let actual = notification.require("period3")?;
            if actual != expected {
                return Err(BillingError::text_mismatch("period3", expected, actual));
            }
            expect_currency(notification, purchase)?;
        }
        NotificationKind::Refund => {
            expect_currency(notification, purchase)?;
        }
        NotificationKind::RecurringCanceled | NotificationKind::SubscriptionCanceled => {}
    }

    // Refunds report tax negated and possibly in part
    if kind != NotificationKind::Refund {
        if let Some(tax) = notification.optional_decimal("tax")? {
            expect_amount("tax", purchase.tax, tax)?;
        }
    }
    Ok(())
}
