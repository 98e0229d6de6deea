//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::{
    BeginCheckoutCommand, BeginCheckoutHandler, CheckAccessHandler, CheckAccessQuery,
    HandleNotificationCommand, HandleNotificationHandler, HandleNotificationResult,
    UnsubscribeCommand, UnsubscribeHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::PurchaseId;

use super::dto::{AccessResponse, CheckoutResponse, ErrorResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared handlers, cloned for each request.
#[derive(Clone)]
pub struct BillingAppState {
    pub notifications: Arc<HandleNotificationHandler>,
    pub unsubscribe: Arc<UnsubscribeHandler>,
    pub checkout: Arc<BeginCheckoutHandler>,
    pub access: Arc<CheckAccessHandler>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /ipn/paypal - PayPal instant payment notification
///
/// Always answers `200` with an empty body. PayPal retries anything else,
/// and retrying a rejected notification cannot help.
pub async fn handle_paypal_ipn(State(state): State<BillingAppState>, body: Bytes) -> StatusCode {
    let cmd = HandleNotificationCommand {
        raw_body: body.to_vec(),
    };

    match state.notifications.handle(cmd).await {
        Ok(HandleNotificationResult::Applied { kind, purchase_id }) => {
            tracing::debug!(kind = kind.as_str(), purchase_id = %purchase_id, "IPN handled");
        }
        Ok(other) => tracing::debug!(outcome = ?other, "IPN acknowledged"),
        Err(e) => tracing::error!(error = %e, "IPN processing failed"),
    }
    StatusCode::OK
}

// ════════════════════════════════════════════════════════════════════════════════
// Purchase endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /purchases/:id/checkout - Start a PayPal checkout
pub async fn begin_checkout(
    State(state): State<BillingAppState>,
    Path(purchase_id): Path<i64>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = BeginCheckoutCommand {
        purchase_id: PurchaseId::new(purchase_id),
    };
    let result = state.checkout.handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /purchases/:id/unsubscribe - Cancel the recurring agreement
pub async fn unsubscribe(
    State(state): State<BillingAppState>,
    Path(purchase_id): Path<i64>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = UnsubscribeCommand {
        purchase_id: PurchaseId::new(purchase_id),
    };
    state.unsubscribe.handle(cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /purchases/:id/access - Paid and active flags
pub async fn check_access(
    State(state): State<BillingAppState>,
    Path(purchase_id): Path<i64>,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = CheckAccessQuery {
        purchase_id: PurchaseId::new(purchase_id),
    };
    let result = state.access.handle(query).await?;
    Ok(Json(AccessResponse::from(result)))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl BillingApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            BillingError::PurchaseNotFound(_) | BillingError::TransactionNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            BillingError::CannotCancelSubscription(_) => {
                (StatusCode::BAD_GATEWAY, "CANNOT_CANCEL_SUBSCRIPTION")
            }
            BillingError::CannotRefund(_) => (StatusCode::BAD_GATEWAY, "CANNOT_REFUND"),
            BillingError::NotASubscription(_) | BillingError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, "INVALID_STATE")
            }
            BillingError::DuplicateNotification(_) => (StatusCode::CONFLICT, "DUPLICATE"),
            BillingError::InvalidToken
            | BillingError::AmountMismatch { .. }
            | BillingError::MissingField(_)
            | BillingError::Invalid(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BillingError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        // Storage details stay in the log
        let message = match &self.0 {
            BillingError::Storage(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}
