//! NotificationVerifier port - Confirms a notification with its sender.
//!
//! PayPal notifications are unsigned. The body is posted back to PayPal with
//! `cmd=_notify-validate` and only a `VERIFIED` answer lets it through.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Answer of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Invalid,
}

#[async_trait]
pub trait NotificationVerifier: Send + Sync {
    /// Sends `raw_body` back unchanged and reports the answer.
    ///
    /// Transport failures are errors; the caller drops the notification.
    async fn verify(&self, raw_body: &[u8]) -> Result<Verification, DomainError>;
}
