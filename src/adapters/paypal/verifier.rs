//! IPN postback verification.
//!
//! PayPal confirms a notification when the exact body is posted back with
//! `cmd=_notify-validate` prepended. Anything other than `VERIFIED` is
//! treated as invalid.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{NotificationVerifier, Verification};

const VALIDATE_PREFIX: &[u8] = b"cmd=_notify-validate&";

/// PayPal implementation of the NotificationVerifier port.
pub struct PayPalNotificationVerifier {
    verify_url: String,
    http_client: reqwest::Client,
}

impl PayPalNotificationVerifier {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Failed to build IPN HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            verify_url: verify_url.into(),
            http_client,
        })
    }

    /// Verifier for the live or sandbox postback endpoint.
    pub fn for_environment(sandbox: bool, timeout: Duration) -> Result<Self, DomainError> {
        Self::new(super::ipn_verify_url(sandbox), timeout)
    }
}

fn postback_body(raw_body: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(VALIDATE_PREFIX.len() + raw_body.len());
    body.extend_from_slice(VALIDATE_PREFIX);
    body.extend_from_slice(raw_body);
    body
}

fn interpret(response: &str) -> Verification {
    if response.trim() == "VERIFIED" {
        Verification::Verified
    } else {
        Verification::Invalid
    }
}

#[async_trait]
impl NotificationVerifier for PayPalNotificationVerifier {
    async fn verify(&self, raw_body: &[u8]) -> Result<Verification, DomainError> {
        let response = self
            .http_client
            .post(&self.verify_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(postback_body(raw_body))
            .send()
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("IPN verification request failed: {}", e),
                )
            })?;

        if !response.status().is_success() {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                format!("IPN verification returned {}", response.status()),
            ));
        }

        let text = response.text().await.map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Failed to read IPN verification response: {}", e),
            )
        })?;

        let verification = interpret(&text);
        if verification == Verification::Invalid {
            tracing::warn!(response = %text.trim(), "PayPal did not verify notification");
        }
        Ok(verification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postback_prepends_validate_command() {
        let body = postback_body(b"txn_id=1&payment_status=Completed");
        assert_eq!(
            body,
            b"cmd=_notify-validate&txn_id=1&payment_status=Completed".to_vec()
        );
    }

    #[test]
    fn only_verified_is_accepted() {
        assert_eq!(interpret("VERIFIED"), Verification::Verified);
        assert_eq!(interpret("VERIFIED\r\n"), Verification::Verified);
        assert_eq!(interpret("INVALID"), Verification::Invalid);
        assert_eq!(interpret("verified"), Verification::Invalid);
        assert_eq!(interpret(""), Verification::Invalid);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let verifier =
            PayPalNotificationVerifier::new("http://127.0.0.1:9/webscr", Duration::from_secs(2))
                .unwrap();
        assert!(verifier.verify(b"txn_id=1").await.is_err());
    }
}
