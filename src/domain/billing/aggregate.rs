//! Aggregate totals and the parent chain used to decide whether a purchase
//! is paid.

use rust_decimal::Decimal;
use std::collections::HashSet;

use crate::domain::foundation::{PurchaseId, ValidationError};

use super::errors::BillingError;
use super::purchase::{PaymentStatus, Purchase, PurchaseDetails, SubscriptionState};

/// Longest parent chain that is followed before giving up.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// Recomputes an aggregate's price, shipping and tax from its children.
///
/// # Errors
///
/// - `Invalid` if `aggregate` is not an aggregate or a child belongs to
///   another parent.
/// - `AmountMismatch` if a child is priced in another currency.
pub fn calc(aggregate: &mut Purchase, children: &[Purchase]) -> Result<(), BillingError> {
    let mut price = Decimal::ZERO;
    let mut shipping = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for child in children {
        if child.parent_id != Some(aggregate.id) {
            return Err(ValidationError::invalid_format(
                "parent",
                format!("purchase {} is not a child of {}", child.id, aggregate.id),
            )
            .into());
        }
        if child.item.currency != aggregate.item.currency {
            return Err(BillingError::text_mismatch(
                "currency",
                aggregate.item.currency.as_str(),
                child.item.currency.as_str(),
            ));
        }
        price += child.price();
        shipping += child.shipping;
        tax += child.tax;
    }

    let PurchaseDetails::Aggregate(details) = &mut aggregate.details else {
        return Err(ValidationError::invalid_format(
            "purchase",
            format!("purchase {} is not an aggregate", aggregate.id),
        )
        .into());
    };
    details.price = price;
    aggregate.shipping = shipping;
    aggregate.tax = tax;
    Ok(())
}

fn paid_here(purchase: &Purchase) -> bool {
    match purchase.status() {
        Some(status) => status == PaymentStatus::Paid,
        None => matches!(
            purchase.subscription().map(|details| details.state),
            Some(SubscriptionState::ActiveManual | SubscriptionState::ActiveAutomatic)
        ),
    }
}

/// True if this purchase or one of its ancestors carries the payment.
///
/// A cycle or a chain deeper than [`MAX_CHAIN_DEPTH`] counts as unpaid. A
/// missing parent ends the walk.
pub fn paid_via_chain<'a, F>(start: &'a Purchase, lookup: F) -> bool
where
    F: Fn(PurchaseId) -> Option<&'a Purchase>,
{
    let mut visited = HashSet::new();
    let mut current = Some(start);

    while let Some(purchase) = current {
        if !visited.insert(purchase.id) || visited.len() > MAX_CHAIN_DEPTH {
            tracing::warn!(purchase_id = %start.id, "parent chain loops or is too deep");
            return false;
        }
        if paid_here(purchase) {
            return true;
        }
        current = purchase.parent_id.and_then(&lookup);
    }
    false
}

/// Paid (directly, through a parent, or gratis) and not blocked.
pub fn is_paid<'a, F>(purchase: &'a Purchase, lookup: F) -> bool
where
    F: Fn(PurchaseId) -> Option<&'a Purchase>,
{
    (purchase.gratis || paid_via_chain(purchase, lookup)) && !purchase.blocked
}
