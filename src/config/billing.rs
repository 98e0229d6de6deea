//! Billing engine configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Billing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Prefix of correlation tokens and invoice ids; tells apart several
    /// shops sharing one PayPal account
    pub realm: String,

    /// HMAC key for correlation tokens
    pub secret_key: SecretString,

    /// Scheme and host PayPal posts notifications to
    pub ipn_host: String,

    /// Days ahead of the due date the first reminder goes out
    #[serde(default = "default_days_before_remind")]
    pub days_before_due_remind: u32,

    /// Days ahead of the trial end the first reminder goes out
    #[serde(default = "default_days_before_remind")]
    pub days_before_trial_end_remind: u32,

    /// Refund every accepted payment (test shops)
    #[serde(default)]
    pub auto_refund: bool,

    /// Seconds between reminder runs; 0 disables the scheduler
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,
}

impl BillingConfig {
    /// Absolute URL of the IPN endpoint
    pub fn notify_url(&self) -> String {
        format!("{}/ipn/paypal", self.ipn_host.trim_end_matches('/'))
    }

    pub fn reminder_interval(&self) -> Option<Duration> {
        (self.reminder_interval_secs > 0).then(|| Duration::from_secs(self.reminder_interval_secs))
    }

    /// Validate billing configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.realm.is_empty() || self.realm.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidRealm);
        }
        if self.secret_key.expose_secret().len() < 16 {
            return Err(ValidationError::SecretKeyTooShort);
        }
        if !self.ipn_host.starts_with("http://") && !self.ipn_host.starts_with("https://") {
            return Err(ValidationError::InvalidIpnHost);
        }
        if *environment == Environment::Production && !self.ipn_host.starts_with("https://") {
            return Err(ValidationError::IpnHostMustBeHttps);
        }
        Ok(())
    }
}

fn default_days_before_remind() -> u32 {
    10
}

fn default_reminder_interval() -> u64 {
    3600
}
