//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    begin_checkout, check_access, handle_paypal_ipn, health, unsubscribe, BillingAppState,
};

/// Create the purchase API router.
///
/// # Routes
/// - `POST /:id/checkout` - Start a PayPal checkout
/// - `POST /:id/unsubscribe` - Cancel the recurring agreement
/// - `GET /:id/access` - Paid and active flags
pub fn purchase_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/:id/checkout", post(begin_checkout))
        .route("/:id/unsubscribe", post(unsubscribe))
        .route("/:id/access", get(check_access))
}

/// Create the notification router.
///
/// Not authenticated; every notification is verified with PayPal.
///
/// # Routes
/// - `POST /paypal` - PayPal instant payment notification
pub fn ipn_routes() -> Router<BillingAppState> {
    Router::new().route("/paypal", post(handle_paypal_ipn))
}

/// Create the complete billing router.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/purchases", purchase_routes())
        .nest("/ipn", ipn_routes())
        .route("/health", get(health))
}

/// The billing router with state, request tracing and a request timeout.
pub fn app(state: BillingAppState, request_timeout: Duration) -> Router {
    billing_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::*;
    use crate::application::{
        BeginCheckoutHandler, CheckAccessHandler, HandleNotificationHandler,
        NotificationSettings, UnsubscribeHandler,
    };
    use crate::domain::billing::fixtures::*;
    use crate::domain::billing::{Processor, TokenCodec, TransactionKind};
    use crate::domain::foundation::{PaymentId, PurchaseId};
    use crate::domain::ipn::CheckoutSettings;
    use crate::ports::{NoopCallback, Verification};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn codec() -> TokenCodec {
        TokenCodec::new("shop", &SecretString::new("test-secret".to_string())).unwrap()
    }

    fn state(harness: &Harness) -> BillingAppState {
        let store = Arc::new(harness.store.clone());
        let lifecycle = harness.lifecycle();
        BillingAppState {
            notifications: Arc::new(HandleNotificationHandler::new(
                store.clone(),
                Arc::new(StaticVerifier(Verification::Verified)),
                harness.processor.clone(),
                Arc::new(NoopCallback),
                lifecycle.clone(),
                harness.clock.clone(),
                codec(),
                NotificationSettings {
                    business_email: "seller@example.com".to_string(),
                    auto_refund: false,
                },
            )),
            unsubscribe: Arc::new(UnsubscribeHandler::new(lifecycle)),
            checkout: Arc::new(BeginCheckoutHandler::new(
                store.clone(),
                harness.clock.clone(),
                codec(),
                CheckoutSettings {
                    business: "seller@example.com".to_string(),
                    notify_url: "https://shop.example.com/ipn/paypal".to_string(),
                    sandbox: true,
                },
            )),
            access: Arc::new(CheckAccessHandler::new(store, harness.clock.clone())),
        }
    }

    fn router(harness: &Harness) -> Router {
        app(state(harness), Duration::from_secs(5))
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let harness = Harness::new(date(2024, 2, 15));
        let response = router(&harness)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn garbage_ipn_is_acknowledged_with_empty_body() {
        let harness = Harness::new(date(2024, 2, 15));
        let response = router(&harness)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ipn/paypal")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("txn_type=web_accept&custom=forged"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn ipn_payment_is_applied() {
        let harness = Harness::new(date(2024, 2, 15));
        harness.store.insert_purchase(simple(1, Decimal::new(1000, 2))).await;
        let transaction = harness
            .store
            .insert_transaction(PurchaseId::new(1), TransactionKind::OneTime, Utc::now())
            .await;
        let form = serde_urlencoded::to_string([
            ("receiver_email", "seller@example.com"),
            ("custom", codec().encode(transaction.id).as_str()),
            ("txn_type", "web_accept"),
            ("payment_status", "Completed"),
            ("mc_gross", "10.00"),
            ("shipping", "0.00"),
            ("mc_currency", "USD"),
            ("txn_id", "T-100"),
        ])
        .unwrap();

        let response = router(&harness)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ipn/paypal")
                    .body(Body::from(form))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(harness.store.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_refusal_is_bad_gateway() {
        let harness = Harness::with_processor(date(2024, 2, 15), MockProcessor::failing_cancel());
        let mut purchase = subscription(1, date(2024, 3, 1));
        purchase
            .activate_subscription(Processor::PayPal, "I-1", None, PaymentId::new(1))
            .unwrap();
        harness.store.insert_purchase(purchase).await;

        let response = router(&harness)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/purchases/1/unsubscribe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["error_code"], "CANNOT_CANCEL_SUBSCRIPTION");
    }

    #[tokio::test]
    async fn checkout_returns_form() {
        let harness = Harness::new(date(2024, 2, 15));
        harness.store.insert_purchase(simple(4, Decimal::new(500, 2))).await;

        let response = router(&harness)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/purchases/4/checkout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["action"], "https://www.sandbox.paypal.com/cgi-bin/webscr");
    }

    #[tokio::test]
    async fn access_of_unknown_purchase_is_not_found() {
        let harness = Harness::new(date(2024, 2, 15));

        let response = router(&harness)
            .oneshot(
                Request::builder()
                    .uri("/purchases/42/access")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
