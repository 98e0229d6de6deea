//! PayPal REST client.
//!
//! Implements `ProcessorClient` against the v1 REST API. Calls authenticate
//! with an OAuth2 client-credentials token which is cached until shortly
//! before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::domain::billing::Currency;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{ProcessorClient, ProcessorError};

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const UPGRADE_NOTE: &str = "Upgrading billing plan";
const CANCEL_NOTE: &str = "Canceling a service";

/// Credentials and endpoint for the REST API.
#[derive(Clone)]
pub struct PayPalApiConfig {
    client_id: SecretString,
    client_secret: SecretString,
    api_base_url: String,
    request_timeout: Duration,
}

impl PayPalApiConfig {
    pub fn new(
        client_id: SecretString,
        client_secret: SecretString,
        sandbox: bool,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            api_base_url: super::api_base_url(sandbox).to_string(),
            request_timeout,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

impl std::fmt::Debug for PayPalApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalApiConfig")
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// PayPal implementation of the ProcessorClient port.
pub struct PayPalClient {
    config: PayPalApiConfig,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    pub fn new(config: PayPalApiConfig) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::InternalError,
                    format!("Failed to build PayPal HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            config,
            http_client,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/v1/oauth2/token", self.config.api_base_url);
        let response = self
            .http_client
            .post(&url)
            .basic_auth(
                self.config.client_id.expose_secret(),
                Some(self.config.client_secret.expose_secret()),
            )
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| format!("PayPal authentication failed: {}", e))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(error = %body, "PayPal token request failed");
            return Err(error_message(&body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse PayPal token response: {}", e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// POSTs a JSON body and returns the failure message on non-2xx.
    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<(), String> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("PayPal request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, path = %path, error = %body, "PayPal API error");
            return Err(error_message(&body));
        }
        Ok(())
    }
}

/// Note PayPal stores with a cancelled agreement.
fn cancel_note(is_upgrade: bool) -> &'static str {
    if is_upgrade {
        UPGRADE_NOTE
    } else {
        CANCEL_NOTE
    }
}

/// Refund request body. An empty object refunds the full sale.
fn refund_body(amount: Option<Decimal>, currency: &Currency) -> serde_json::Value {
    match amount {
        Some(amount) => json!({
            "amount": {
                "total": amount.round_dp(2).to_string(),
                "currency": currency.as_str(),
            }
        }),
        None => json!({}),
    }
}

/// Best human-readable message from a PayPal error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ApiErrorBody {
            error_description: Some(description),
            ..
        }) => description,
        Ok(ApiErrorBody {
            name: Some(name), ..
        }) => name,
        _ if body.trim().is_empty() => "PayPal returned an error".to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl ProcessorClient for PayPalClient {
    async fn cancel_agreement(&self, reference: &str, is_upgrade: bool) -> Result<(), ProcessorError> {
        let path = format!("/v1/payments/billing-agreements/{}/cancel", reference);
        self.post_json(&path, json!({ "note": cancel_note(is_upgrade) }))
            .await
            .map_err(ProcessorError::CannotCancel)?;

        tracing::info!(agreement = %reference, is_upgrade, "PayPal agreement canceled");
        Ok(())
    }

    async fn refund(
        &self,
        transaction_reference: &str,
        amount: Option<Decimal>,
        currency: &Currency,
    ) -> Result<(), ProcessorError> {
        let path = format!("/v1/payments/sale/{}/refund", transaction_reference);
        self.post_json(&path, refund_body(amount, currency))
            .await
            .map_err(ProcessorError::CannotRefund)?;

        tracing::info!(sale = %transaction_reference, amount = ?amount, "PayPal sale refunded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_note_depends_on_upgrade() {
        assert_eq!(cancel_note(true), "Upgrading billing plan");
        assert_eq!(cancel_note(false), "Canceling a service");
    }

    #[test]
    fn partial_refund_sends_amount_and_currency() {
        let body = refund_body(Some(Decimal::new(970, 2)), &Currency::usd());
        assert_eq!(body["amount"]["total"], "9.70");
        assert_eq!(body["amount"]["currency"], "USD");
    }

    #[test]
    fn full_refund_sends_empty_body() {
        assert_eq!(refund_body(None, &Currency::usd()), json!({}));
    }

    #[test]
    fn error_message_prefers_message_field() {
        let body = r#"{"name":"INVALID_RESOURCE_ID","message":"Agreement not found"}"#;
        assert_eq!(error_message(body), "Agreement not found");
    }

    #[test]
    fn error_message_falls_back_to_name_or_text() {
        assert_eq!(error_message(r#"{"name":"TRANSACTION_REFUSED"}"#), "TRANSACTION_REFUSED");
        assert_eq!(
            error_message(r#"{"error":"invalid_client","error_description":"Bad credentials"}"#),
            "Bad credentials"
        );
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
        assert_eq!(error_message(""), "PayPal returned an error");
    }

    #[test]
    fn config_debug_redacts_credentials() {
        let config = PayPalApiConfig::new(
            SecretString::new("client".to_string()),
            SecretString::new("very-secret".to_string()),
            true,
            Duration::from_secs(30),
        );
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("api.sandbox.paypal.com"));
    }

    #[tokio::test]
    async fn unreachable_api_reports_cannot_cancel() {
        let config = PayPalApiConfig::new(
            SecretString::new("client".to_string()),
            SecretString::new("secret".to_string()),
            true,
            Duration::from_secs(2),
        )
        .with_base_url("http://127.0.0.1:9");
        let client = PayPalClient::new(config).unwrap();

        let result = client.cancel_agreement("I-123", false).await;
        assert!(matches!(result, Err(ProcessorError::CannotCancel(_))));
    }
}
