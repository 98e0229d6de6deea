//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid listen address")]
    InvalidSocketAddr,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("Realm must be non-empty and contain no whitespace")]
    InvalidRealm,

    #[error("Secret key must be at least 16 characters")]
    SecretKeyTooShort,

    #[error("IPN host must be an absolute URL")]
    InvalidIpnHost,

    #[error("IPN host must use HTTPS in production")]
    IpnHostMustBeHttps,

    #[error("Sandbox mode is not allowed in production")]
    SandboxInProduction,

    #[error("Invalid PayPal business email")]
    InvalidBusinessEmail,

    #[error("Invalid Resend API key format")]
    InvalidResendKey,

    #[error("Invalid email sender mailbox")]
    InvalidSender,
}
