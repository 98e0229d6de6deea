//! HTTP adapter for billing endpoints.
//!
//! - `POST /ipn/paypal` - PayPal instant payment notifications
//! - `POST /purchases/:id/checkout` - Start a PayPal checkout
//! - `POST /purchases/:id/unsubscribe` - Cancel a subscription
//! - `GET /purchases/:id/access` - Paid and active flags
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState};
pub use routes::{app, billing_router};
