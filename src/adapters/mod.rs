//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing engine to external systems:
//! - `postgres` / `memory` - Purchase storage
//! - `paypal` - PayPal REST API and IPN verification
//! - `email` - Outgoing email (Resend, or log only)
//! - `clock` - System and fixed clocks
//! - `http` - Axum routes

pub mod clock;
pub mod email;
pub mod http;
pub mod memory;
pub mod paypal;
pub mod postgres;

pub use clock::{FixedClock, SystemClock};
pub use email::{LoggingEmailSender, ResendEmailSender};
pub use memory::InMemoryPurchaseStore;
pub use paypal::{PayPalApiConfig, PayPalClient, PayPalNotificationVerifier};
pub use postgres::PostgresPurchaseStore;
