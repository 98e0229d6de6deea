//! Strongly-typed identifier value objects.
//!
//! Billing rows use database serial keys. The correlation token carries the
//! transaction id as a plain integer, so every id here wraps an `i64`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw serial key.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw serial key.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

serial_id!(
    /// Identifier of a sold purchase (any variant).
    PurchaseId
);

serial_id!(
    /// Identifier of one redirect/session to the payment processor.
    TransactionId
);

serial_id!(
    /// Identifier of an accepted payment.
    PaymentId
);

serial_id!(
    /// Identifier of a sellable item.
    ItemId
);

serial_id!(
    /// Identifier of a product (reference data).
    ProductId
);
