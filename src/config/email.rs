//! Outgoing reminder mail

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Without a Resend key reminders are written to the log instead of sent.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub resend_api_key: Option<SecretString>,

    /// Mailbox reminders are sent from, e.g. `Billing <billing@shop.example>`.
    #[serde(default = "default_sender")]
    pub sender: String,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl EmailConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = &self.resend_api_key {
            if !key.expose_secret().starts_with("re_") {
                return Err(ValidationError::InvalidResendKey);
            }
        }
        let address = match self.sender.rsplit_once('<') {
            Some((_, rest)) => rest.strip_suffix('>').unwrap_or(""),
            None => self.sender.as_str(),
        };
        match address.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(ValidationError::InvalidSender),
        }
        if self.send_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            resend_api_key: None,
            sender: default_sender(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_sender() -> String {
    "Billing <billing@localhost.localdomain>".to_string()
}

fn default_send_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_sender(sender: &str) -> EmailConfig {
        EmailConfig {
            sender: sender.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn logging_only_setup_is_valid() {
        assert!(EmailConfig::default().validate().is_ok());
    }

    #[test]
    fn sender_may_be_bare_or_named() {
        assert!(with_sender("billing@shop.example").validate().is_ok());
        assert!(with_sender("Shop Billing <billing@shop.example>").validate().is_ok());
    }

    #[test]
    fn malformed_sender_is_rejected() {
        for sender in ["billing", "Billing <billing@shop.example", "Billing <@shop.example>"] {
            assert!(
                matches!(with_sender(sender).validate(), Err(ValidationError::InvalidSender)),
                "{sender}"
            );
        }
    }

    #[test]
    fn resend_key_needs_resend_prefix() {
        let config = EmailConfig {
            resend_api_key: Some(SecretString::new("sk_live_123".to_string())),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidResendKey)));
    }
}
