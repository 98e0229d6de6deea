//! Accepted payments and the processors they come from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, TransactionId, ValidationError};

/// Payment processors known to the billing schema.
///
/// Only PayPal has an adapter; the others keep their persisted codes reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Processor {
    Avangate,
    PayPal,
    Braintree,
    DalPay,
    Recurly,
}

impl Processor {
    pub fn code(&self) -> i16 {
        match self {
            Processor::Avangate => 1,
            Processor::PayPal => 2,
            Processor::Braintree => 3,
            Processor::DalPay => 4,
            Processor::Recurly => 5,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, ValidationError> {
        match code {
            1 => Ok(Processor::Avangate),
            2 => Ok(Processor::PayPal),
            3 => Ok(Processor::Braintree),
            4 => Ok(Processor::DalPay),
            5 => Ok(Processor::Recurly),
            other => Err(ValidationError::out_of_range("processor", 1, 5, i64::from(other))),
        }
    }
}

/// How a payment was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentKind {
    /// A one-time charge.
    Simple,
    /// A charge under a recurring agreement.
    Automatic {
        processor: Processor,
        subscription_reference: String,
    },
}

/// A payment accepted from a verified notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub transaction_id: TransactionId,
    pub payment_time: DateTime<Utc>,
    pub email: Option<String>,
    pub kind: PaymentKind,
}

impl Payment {
    /// Recurring agreement reference, if this is an automatic payment.
    pub fn subscription_reference(&self) -> Option<&str> {
        match &self.kind {
            PaymentKind::Automatic {
                subscription_reference,
                ..
            } => Some(subscription_reference),
            PaymentKind::Simple => None,
        }
    }
}

/// A payment that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub transaction_id: TransactionId,
    pub payment_time: DateTime<Utc>,
    pub email: Option<String>,
    pub kind: PaymentKind,
}

impl NewPayment {
    pub fn simple(
        transaction_id: TransactionId,
        payment_time: DateTime<Utc>,
        email: Option<String>,
    ) -> Self {
        Self {
            transaction_id,
            payment_time,
            email,
            kind: PaymentKind::Simple,
        }
    }

    pub fn automatic(
        transaction_id: TransactionId,
        payment_time: DateTime<Utc>,
        email: Option<String>,
        processor: Processor,
        subscription_reference: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            payment_time,
            email,
            kind: PaymentKind::Automatic {
                processor,
                subscription_reference: subscription_reference.into(),
            },
        }
    }

    /// Attaches the id assigned by storage.
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            transaction_id: self.transaction_id,
            payment_time: self.payment_time,
            email: self.email,
            kind: self.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_codes_round_trip() {
        for processor in [
            Processor::Avangate,
            Processor::PayPal,
            Processor::Braintree,
            Processor::DalPay,
            Processor::Recurly,
        ] {
            assert_eq!(Processor::from_code(processor.code()), Ok(processor));
        }
        assert_eq!(Processor::PayPal.code(), 2);
    }

    #[test]
    fn automatic_payment_exposes_reference() {
        let payment = NewPayment::automatic(
            TransactionId::new(1),
            Utc::now(),
            None,
            Processor::PayPal,
            "I-ABC",
        )
        .into_payment(PaymentId::new(5));

        assert_eq!(payment.subscription_reference(), Some("I-ABC"));
        assert_eq!(payment.id, PaymentId::new(5));
    }

    #[test]
    fn simple_payment_has_no_reference() {
        let payment = NewPayment::simple(TransactionId::new(1), Utc::now(), None)
            .into_payment(PaymentId::new(1));
        assert_eq!(payment.subscription_reference(), None);
    }
}
