//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_purchase, get_subscription, handle_callback, handle_gateway_webhook, health,
    initiate_mandate, run_recurring_billing, BillingAppState,
};

/// Routes for the authenticated user (`X-User-Id`).
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/mandates", post(initiate_mandate))
        .route("/purchases", post(create_purchase))
        .route("/subscription", get(get_subscription))
        .route("/callback", get(handle_callback))
        .route("/recurring/run", post(run_recurring_billing))
}

/// Gateway webhooks. No user auth; authenticity is checked by signature
/// after the acknowledgment.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}

/// Complete billing router, mounted at the root.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/billing", billing_routes())
        .nest("/api/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use secrecy::SecretString;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::adapters::http::billing::{BillingPorts, BillingSettings, RedirectTargets};
    use crate::adapters::queue::ChannelWebhookQueue;
    use crate::application::handlers::billing::test_support::{
        callback_urls, gateway_config, pending_mandate, Fixture,
    };
    use crate::application::handlers::billing::RecurringBillingConfig;
    use crate::domain::billing::MandateStatus;
    use crate::ports::WebhookDelivery;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    const CRON_SECRET: &str = "cron-secret";

    struct TestApp {
        fx: Fixture,
        state: BillingAppState,
        deliveries: mpsc::Receiver<WebhookDelivery>,
    }

    fn test_app() -> TestApp {
        let fx = Fixture::new();
        let (queue, deliveries) = ChannelWebhookQueue::bounded(8);
        let ports = BillingPorts {
            mandates: fx.store.clone(),
            subscriptions: fx.store.clone(),
            purchases: fx.store.clone(),
            catalog: fx.store.clone(),
            gateway_config: fx.store.clone(),
            gateway: fx.gateway.clone(),
            notifier: fx.notifier.clone(),
            queue: Arc::new(queue),
        };
        let settings = BillingSettings {
            gateway: gateway_config(),
            urls: callback_urls(),
            redirects: RedirectTargets::new(
                "https://app.example.com/payment/success",
                "https://app.example.com/payment/failure",
            )
            .unwrap(),
            cron_secret: Some(SecretString::new(CRON_SECRET.to_string())),
            recurring: RecurringBillingConfig::default(),
            verify_timeout: Duration::from_secs(1),
        };
        TestApp {
            state: BillingAppState::new(ports, settings),
            fx,
            deliveries,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, user: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(response: &axum::response::Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Router Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app();
        let response = billing_router()
            .with_state(app.state)
            .oneshot(get("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_is_acknowledged_and_queued() {
        let mut app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/webhooks/gateway")
            .header("x-webhook-signature", "bm90LWEtc2lnbmF0dXJl")
            .header("x-webhook-timestamp", "1700000000")
            .body(Body::from(r#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#))
            .unwrap();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"ok": true}));
        let delivery = app.deliveries.recv().await.unwrap();
        assert_eq!(delivery.signature.as_deref(), Some("bm90LWEtc2lnbmF0dXJl"));
        assert_eq!(delivery.raw_body, br#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#.to_vec());
    }

    #[tokio::test]
    async fn webhook_is_acknowledged_when_queue_is_closed() {
        let app = test_app();
        drop(app.deliveries);

        let response = billing_router()
            .with_state(app.state)
            .oneshot(post_json("/api/webhooks/gateway", None, "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["ok"], true);
    }

    #[tokio::test]
    async fn callback_without_ids_redirects_to_failure() {
        let app = test_app();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(get("/api/billing/callback"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "https://app.example.com/payment/failure?reason=missing_ids"
        );
    }

    #[tokio::test]
    async fn conflicting_callback_keys_still_redirect() {
        let app = test_app();
        app.fx.store.insert_mandate(pending_mandate("m1", "user-1"));

        let response = billing_router()
            .with_state(app.state)
            .oneshot(get(
                "/api/billing/callback?order_id=o1&orderId=o2&mandate_ref=m1",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "https://app.example.com/payment/failure?reason=missing_ids"
        );
        assert_eq!(app.fx.gateway.calls_to("get_order"), 0);
        assert_eq!(app.fx.store.mandate("m1").unwrap().status, MandateStatus::Pending);
    }

    #[tokio::test]
    async fn paid_callback_activates_and_redirects_to_success() {
        let app = test_app();
        app.fx.store.insert_mandate(pending_mandate("m1", "user-1"));
        app.fx.gateway.set_mandate_order("order_1", "m1", "PAID");

        let response = billing_router()
            .with_state(app.state)
            .oneshot(get("/api/billing/callback?order_id=order_1&mandate_ref=m1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "https://app.example.com/payment/success?orderId=order_1"
        );
        assert_eq!(app.fx.store.mandate("m1").unwrap().status, MandateStatus::Active);
        assert_eq!(app.fx.store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn mandate_requires_user() {
        let app = test_app();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(post_json(
                "/api/billing/mandates",
                None,
                r#"{"planId":"pro","frequency":"MONTHLY"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mandate_is_created() {
        let app = test_app();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(post_json(
                "/api/billing/mandates",
                Some("user-1"),
                r#"{"planId":"pro","frequency":"MONTHLY"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let reference = body["externalRef"].as_str().unwrap().to_string();
        assert!(body["mandateId"].is_string());
        assert_eq!(
            app.fx.store.mandate(&reference).unwrap().status,
            MandateStatus::Pending
        );
    }

    #[tokio::test]
    async fn mandate_for_unknown_plan_is_404() {
        let app = test_app();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(post_json(
                "/api/billing/mandates",
                Some("user-1"),
                r#"{"planId":"enterprise","frequency":"YEARLY"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["errorCode"], "PLAN_NOT_FOUND");
    }

    #[tokio::test]
    async fn purchase_is_created() {
        let app = test_app();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(post_json(
                "/api/billing/purchases",
                Some("user-1"),
                r#"{"productId":"masterclass"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert!(body["orderId"].is_string());
        assert_eq!(app.fx.store.purchases().len(), 1);
    }

    #[tokio::test]
    async fn subscription_is_null_without_one() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/billing/subscription")
            .header("X-User-Id", "user-1")
            .body(Body::empty())
            .unwrap();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn recurring_run_rejects_bad_cron_secret() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/billing/recurring/run")
            .header("x-cron-secret", "guess")
            .body(Body::empty())
            .unwrap();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn recurring_run_returns_results() {
        let app = test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/billing/recurring/run")
            .header("x-cron-secret", CRON_SECRET)
            .body(Body::empty())
            .unwrap();

        let response = billing_router()
            .with_state(app.state)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"results": []}));
    }
}
