//! Resend email adapter.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{EmailSender, EmailTemplate};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
    tags: [Tag<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Tag<'a> {
    name: &'static str,
    value: &'a str,
}

/// Sends template emails through Resend.
pub struct ResendEmailSender {
    api_key: SecretString,
    from: String,
    api_url: String,
    http_client: reqwest::Client,
}

impl ResendEmailSender {
    /// `from` is the full header value, e.g. `Billing <billing@example.com>`.
    pub fn new(api_key: SecretString, from: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::EmailError,
                    format!("Failed to build email HTTP client: {}", e),
                )
            })?;
        Ok(Self {
            api_key,
            from: from.into(),
            api_url: RESEND_API_URL.to_string(),
            http_client,
        })
    }

    /// Set a custom API URL (for testing).
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    fn request<'a>(
        &'a self,
        template: EmailTemplate,
        recipient: &'a str,
        context: &serde_json::Value,
    ) -> SendRequest<'a> {
        SendRequest {
            from: &self.from,
            to: [recipient],
            subject: template.subject(),
            text: super::render_text(template, context),
            tags: [Tag {
                name: "template",
                value: template.id(),
            }],
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(
        &self,
        template: EmailTemplate,
        recipient: &str,
        context: serde_json::Value,
    ) -> Result<(), DomainError> {
        let request = self.request(template, recipient, &context);

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                DomainError::new(ErrorCode::EmailError, format!("Failed to send email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, error = %error_text, template = template.id(), "Resend API error");
            return Err(DomainError::new(
                ErrorCode::EmailError,
                format!("Email provider returned {}: {}", status, error_text),
            ));
        }

        tracing::info!(template = template.id(), recipient = %recipient, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sender() -> ResendEmailSender {
        ResendEmailSender::new(
            SecretString::new("re_test".to_string()),
            "Billing <billing@example.com>",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn request_carries_template_tag_and_subject() {
        let sender = sender();
        let request = sender.request(EmailTemplate::DeadlineRemind, "a@example.com", &json!({}));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["to"][0], "a@example.com");
        assert_eq!(body["from"], "Billing <billing@example.com>");
        assert_eq!(body["subject"], "Your subscription payment is overdue");
        assert_eq!(body["tags"][0]["value"], "deadline-remind");
    }

    #[tokio::test]
    async fn unreachable_api_is_email_error() {
        let sender = sender().with_api_url("http://127.0.0.1:9/emails");
        let err = sender
            .send(EmailTemplate::DueRemind, "a@example.com", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EmailError);
    }
}
