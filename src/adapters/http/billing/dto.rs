//! HTTP DTOs (Data Transfer Objects) for billing endpoints.

use serde::Serialize;

use crate::application::{BeginCheckoutResult, CheckAccessResult};

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Form the buyer's browser posts to PayPal.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub transaction_id: i64,
    /// PayPal URL the form is posted to.
    pub action: String,
    /// Hidden form fields, in order.
    pub fields: Vec<(String, String)>,
}

impl From<BeginCheckoutResult> for CheckoutResponse {
    fn from(result: BeginCheckoutResult) -> Self {
        Self {
            transaction_id: result.transaction_id.as_i64(),
            action: result.form.action,
            fields: result.form.fields,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessResponse {
    pub is_paid: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_state: Option<String>,
}

impl From<CheckAccessResult> for AccessResponse {
    fn from(result: CheckAccessResult) -> Self {
        Self {
            is_paid: result.is_paid,
            is_active: result.is_active,
            subscription_state: result
                .subscription_state
                .map(|state| state.as_str().to_string()),
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::SubscriptionState;

    #[test]
    fn access_response_names_state() {
        let response = AccessResponse::from(CheckAccessResult {
            is_paid: true,
            is_active: true,
            subscription_state: Some(SubscriptionState::ActiveAutomatic),
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["subscription_state"], "active_automatic");
    }

    #[test]
    fn one_time_access_omits_state() {
        let response = AccessResponse::from(CheckAccessResult {
            is_paid: false,
            is_active: false,
            subscription_state: None,
        });
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("subscription_state"));
    }
}
