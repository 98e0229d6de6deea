//! PayPal configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// PayPal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalConfig {
    /// Merchant account email; notifications for other receivers are dropped
    pub business_email: String,

    /// Merchant account id, preferred over the email in checkout forms
    pub business_id: Option<String>,

    /// REST API client id
    pub client_id: SecretString,

    /// REST API client secret
    pub client_secret: SecretString,

    /// Use the sandbox endpoints
    #[serde(default)]
    pub sandbox: bool,

    /// Timeout of calls to the REST API and IPN postback, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PayPalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Value of the checkout form's `business` field
    pub fn checkout_business(&self) -> &str {
        self.business_id.as_deref().unwrap_or(&self.business_email)
    }

    /// Validate PayPal configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.business_email.is_empty() {
            return Err(ValidationError::MissingRequired("PAYPAL_BUSINESS_EMAIL"));
        }
        if !self.business_email.contains('@') {
            return Err(ValidationError::InvalidBusinessEmail);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.sandbox && *environment == Environment::Production {
            return Err(ValidationError::SandboxInProduction);
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PayPalConfig {
        PayPalConfig {
            business_email: "seller@example.com".to_string(),
            business_id: None,
            client_id: SecretString::new("client".to_string()),
            client_secret: SecretString::new("secret".to_string()),
            sandbox: true,
            request_timeout_secs: default_request_timeout(),
        }
    }

    #[test]
    fn test_checkout_business_prefers_account_id() {
        assert_eq!(config().checkout_business(), "seller@example.com");

        let config = PayPalConfig {
            business_id: Some("ABCDEF123".to_string()),
            ..config()
        };
        assert_eq!(config.checkout_business(), "ABCDEF123");
    }

    #[test]
    fn test_timeout_duration() {
        assert_eq!(config().request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_invalid_email() {
        let config = PayPalConfig {
            business_email: "seller".to_string(),
            ..config()
        };
        assert!(config.validate(&Environment::Development).is_err());
    }

    #[test]
    fn test_validation_sandbox_in_production() {
        assert!(config().validate(&Environment::Development).is_ok());
        assert!(matches!(
            config().validate(&Environment::Production),
            Err(ValidationError::SandboxInProduction)
        ));
    }
}
