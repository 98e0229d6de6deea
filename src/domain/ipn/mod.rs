//! PayPal instant payment notifications.
//!
//! Parsing and classification of IPN bodies, the amount checks run against
//! the purchase, and the Payments Standard checkout form.

mod checkout;
mod notification;
mod verification;

pub use checkout::{checkout_form, CheckoutForm, CheckoutSettings};
pub use notification::{Classification, Notification, NotificationError, NotificationKind};
pub use verification::verify_amounts;
