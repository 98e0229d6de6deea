//! ProcessorClient port - Calls into the payment processor's API.
//!
//! Only the two operations the lifecycle needs: cancelling a recurring
//! agreement and refunding a charge. Implementations bound every call with a
//! timeout and report timeouts and transport failures through the same error
//! as a refusal.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::billing::{BillingError, Currency};

/// Failures reported by the processor API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    /// The agreement could not be canceled.
    #[error("Cannot cancel agreement: {0}")]
    CannotCancel(String),

    /// The refund was refused or could not be sent.
    #[error("Cannot refund: {0}")]
    CannotRefund(String),
}

impl From<ProcessorError> for BillingError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::CannotCancel(message) => BillingError::CannotCancelSubscription(message),
            ProcessorError::CannotRefund(message) => BillingError::CannotRefund(message),
        }
    }
}

/// Port for the processor's REST API.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Cancels the agreement `reference`.
    ///
    /// `is_upgrade` only changes the note shown to the customer.
    async fn cancel_agreement(&self, reference: &str, is_upgrade: bool) -> Result<(), ProcessorError>;

    /// Refunds the charge `transaction_reference`, fully when `amount` is
    /// `None`.
    async fn refund(
        &self,
        transaction_reference: &str,
        amount: Option<Decimal>,
        currency: &Currency,
    ) -> Result<(), ProcessorError>;
}
