//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! ## Storage
//!
//! - `PurchaseStore` / `PurchaseTransaction` - Purchases, payments and the
//!   processed-notification ledger, one unit of work per notification
//!
//! ## Processor
//!
//! - `ProcessorClient` - Cancel agreements and refund charges
//! - `NotificationVerifier` - Out-of-band confirmation of notifications
//!
//! ## Application Services
//!
//! - `EmailSender` - Customer emails
//! - `Clock` - Current date
//! - `PaymentCallback` - Hooks for the selling application

mod clock;
mod email_sender;
mod notification_verifier;
mod payment_callback;
mod processor_client;
mod purchase_store;

pub use clock::Clock;
pub use email_sender::{EmailSender, EmailTemplate};
pub use notification_verifier::{NotificationVerifier, Verification};
pub use payment_callback::{NoopCallback, PaymentCallback};
pub use processor_client::{ProcessorClient, ProcessorError};
pub use purchase_store::{NotificationRecord, PurchaseStore, PurchaseTransaction, SaveResult};
