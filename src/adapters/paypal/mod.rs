//! PayPal adapters.
//!
//! - `PayPalClient` - REST API calls to cancel agreements and refund sales
//! - `PayPalNotificationVerifier` - IPN postback verification

mod client;
mod verifier;

pub use client::{PayPalApiConfig, PayPalClient};
pub use verifier::PayPalNotificationVerifier;

const LIVE_API_URL: &str = "https://api.paypal.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.paypal.com";
const LIVE_IPN_URL: &str = "https://ipnpb.paypal.com/cgi-bin/webscr";
const SANDBOX_IPN_URL: &str = "https://ipnpb.sandbox.paypal.com/cgi-bin/webscr";

/// REST API host for the environment.
pub fn api_base_url(sandbox: bool) -> &'static str {
    if sandbox {
        SANDBOX_API_URL
    } else {
        LIVE_API_URL
    }
}

/// IPN postback endpoint for the environment.
pub fn ipn_verify_url(sandbox: bool) -> &'static str {
    if sandbox {
        SANDBOX_IPN_URL
    } else {
        LIVE_IPN_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_hosts_differ_from_live() {
        assert_eq!(api_base_url(true), "https://api.sandbox.paypal.com");
        assert_eq!(api_base_url(false), "https://api.paypal.com");
        assert!(ipn_verify_url(true).contains("sandbox"));
        assert!(!ipn_verify_url(false).contains("sandbox"));
    }
}
