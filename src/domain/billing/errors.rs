//! Billing error types.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::foundation::{DomainError, PurchaseId, TransactionId, ValidationError};

/// Errors raised by billing operations and the notification engine.
#[derive(Debug, Clone, Error)]
pub enum BillingError {
    /// The correlation token is malformed or forged.
    #[error("Invalid correlation token")]
    InvalidToken,

    /// A notification amount, currency or cycle does not match the purchase.
    #[error("Mismatch in '{field}': expected {expected}, got {actual}")]
    AmountMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// The processor refused to cancel a recurring agreement.
    #[error("Cannot cancel subscription: {0}")]
    CannotCancelSubscription(String),

    /// The processor refused a refund.
    #[error("Cannot refund: {0}")]
    CannotRefund(String),

    #[error("Purchase {0} not found")]
    PurchaseNotFound(PurchaseId),

    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// The notification was already applied. Callers treat this as success.
    #[error("Notification '{0}' was already processed")]
    DuplicateNotification(String),

    /// A subscription-only operation was applied to another purchase kind.
    #[error("Purchase {0} is not a subscription")]
    NotASubscription(PurchaseId),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] DomainError),
}

impl BillingError {
    /// Builds an [`BillingError::AmountMismatch`] for decimal fields.
    pub fn amount_mismatch(field: &'static str, expected: Decimal, actual: Decimal) -> Self {
        BillingError::AmountMismatch {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Builds an [`BillingError::AmountMismatch`] for text fields.
    pub fn text_mismatch(
        field: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        BillingError::AmountMismatch {
            field,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// True for outcomes that must be acknowledged as a success.
    pub fn is_benign(&self) -> bool {
        matches!(self, BillingError::DuplicateNotification(_))
    }

    /// True for rejections caused by the notification content itself.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BillingError::InvalidToken
                | BillingError::AmountMismatch { .. }
                | BillingError::MissingField(_)
                | BillingError::Invalid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_mismatch_names_field_and_values() {
        let err = BillingError::amount_mismatch(
            "mc_gross",
            Decimal::new(1000, 2),
            Decimal::new(100, 2),
        );
        assert_eq!(err.to_string(), "Mismatch in 'mc_gross': expected 10.00, got 1.00");
    }

    #[test]
    fn duplicate_notification_is_benign() {
        assert!(BillingError::DuplicateNotification("txn-1".into()).is_benign());
        assert!(!BillingError::InvalidToken.is_benign());
    }

    #[test]
    fn content_problems_are_rejections() {
        assert!(BillingError::InvalidToken.is_rejection());
        assert!(BillingError::MissingField("custom").is_rejection());
        assert!(!BillingError::CannotRefund("nope".into()).is_rejection());
        assert!(!BillingError::Storage(DomainError::database("down")).is_rejection());
    }
}
