//! Shared harness for billing integration tests.
//!
//! Wires the public router and handlers over the in-memory store, the
//! scripted gateway and a recording notifier.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use secrecy::SecretString;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

use mandate_billing::adapters::http::billing::{
    billing_router, BillingAppState, BillingPorts, BillingSettings, RedirectTargets,
};
use mandate_billing::adapters::{
    ChannelWebhookQueue, InMemoryBillingStore, MockPaymentGateway, RecordingNotifier,
    WebhookWorker, WebhookWorkerConfig,
};
use mandate_billing::application::handlers::billing::{CallbackUrls, RecurringBillingConfig};
use mandate_billing::config::GatewayConfig;
use mandate_billing::domain::billing::{
    sign, BillingFrequency, Mandate, MandateStatus, NewMandate, PlanPrice, ProgramPrice,
};
use mandate_billing::domain::foundation::{ExternalRef, PlanId, ProductId, Timestamp, UserId};
use mandate_billing::ports::WebhookDelivery;

pub const PROGRAM: &str = "masterclass";
pub const SANDBOX_SECRET: &str = "sandbox-secret";
pub const SUCCESS_PAGE: &str = "https://app.example.com/payment/success";
pub const FAILURE_PAGE: &str = "https://app.example.com/payment/failure";

pub struct Harness {
    pub store: Arc<InMemoryBillingStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: BillingAppState,
    deliveries: Option<mpsc::Receiver<WebhookDelivery>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        store.seed_plan(PlanPrice {
            plan_id: PlanId::new("pro").unwrap(),
            base_amount: 49_900,
            tax_amount: 8_982,
            currency: "INR".to_string(),
        });
        store.seed_program(ProgramPrice {
            product_id: ProductId::new(PROGRAM).unwrap(),
            amount: 99_900,
            currency: "INR".to_string(),
        });
        let gateway = Arc::new(MockPaymentGateway::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (queue, deliveries) = ChannelWebhookQueue::bounded(32);

        let mut gateway_config = GatewayConfig::default();
        gateway_config.sandbox.client_id = "sandbox-id".to_string();
        gateway_config.sandbox.client_secret = SecretString::new(SANDBOX_SECRET.to_string());

        let ports = BillingPorts {
            mandates: store.clone(),
            subscriptions: store.clone(),
            purchases: store.clone(),
            catalog: store.clone(),
            gateway_config: store.clone(),
            gateway: gateway.clone(),
            notifier: notifier.clone(),
            queue: Arc::new(queue),
        };
        let settings = BillingSettings {
            gateway: gateway_config,
            urls: CallbackUrls::new(
                "https://api.example.com/api/billing/callback",
                "https://api.example.com/api/webhooks/gateway",
            ),
            redirects: RedirectTargets::new(SUCCESS_PAGE, FAILURE_PAGE).unwrap(),
            cron_secret: None,
            recurring: RecurringBillingConfig::default(),
            verify_timeout: Duration::from_secs(1),
        };

        Self {
            state: BillingAppState::new(ports, settings),
            store,
            gateway,
            notifier,
            deliveries: Some(deliveries),
        }
    }

    pub fn router(&self) -> Router {
        billing_router().with_state(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router().oneshot(request).await.unwrap()
    }

    /// Processes queued deliveries one at a time, in arrival order.
    pub async fn drain_webhooks(&mut self) -> usize {
        let Some(deliveries) = self.deliveries.as_mut() else {
            return 0;
        };
        let mut processed = 0;
        while let Ok(delivery) = deliveries.try_recv() {
            let _ = self.state.process_webhook.handle(delivery).await;
            processed += 1;
        }
        processed
    }

    /// Hands the queue to a `WebhookWorker` and shuts it down at once,
    /// so it runs everything buffered concurrently and returns.
    pub async fn run_worker(&mut self) -> usize {
        let Some(deliveries) = self.deliveries.take() else {
            return 0;
        };
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let worker = WebhookWorker::new(
            deliveries,
            self.state.process_webhook.clone(),
            WebhookWorkerConfig::default(),
        );
        worker.run(shutdown_rx).await
    }

    /// Creates a purchase through the API; returns `(purchase_id, order_id)`.
    pub async fn create_purchase(&self, user: &str) -> (String, String) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/billing/purchases")
            .header("x-user-id", user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"productId":"{}"}}"#, PROGRAM)))
            .unwrap();
        let body = json_body(self.send(request).await).await;
        (
            body["purchaseId"].as_str().unwrap().to_string(),
            body["orderId"].as_str().unwrap().to_string(),
        )
    }

    pub fn insert_pending_mandate(&self, reference: &str, user: &str) -> Mandate {
        let mandate = new_mandate(reference, user);
        self.store.insert_mandate(mandate.clone());
        mandate
    }

    pub fn insert_active_mandate(&self, reference: &str, user: &str) -> Mandate {
        let mut mandate = new_mandate(reference, user);
        mandate.status = MandateStatus::Active;
        self.store.insert_mandate(mandate.clone());
        mandate
    }
}

fn new_mandate(reference: &str, user: &str) -> Mandate {
    Mandate::pending(
        NewMandate {
            external_ref: ExternalRef::new(reference).unwrap(),
            user_id: UserId::new(user).unwrap(),
            plan_id: PlanId::new("pro").unwrap(),
            frequency: BillingFrequency::Monthly,
            payment_method: "upi".to_string(),
            max_amount: 100_000,
            currency: "INR".to_string(),
        },
        Timestamp::now(),
    )
    .unwrap()
}

// =============================================================================
// Request builders
// =============================================================================

pub fn mandate_event(event_type: &str, reference: &str, order_id: &str) -> String {
    format!(
        r#"{{"type":"{}","data":{{"order":{{"order_id":"{}","order_tags":{{"mandate_ref":"{}"}}}}}}}}"#,
        event_type, order_id, reference
    )
}

/// Unix seconds `age_secs` before now, as the gateway sends it.
pub fn webhook_timestamp(age_secs: i64) -> String {
    (Timestamp::now().as_unix_secs() - age_secs).to_string()
}

pub fn signed_webhook(body: &str) -> Request<Body> {
    signed_webhook_at(body, &webhook_timestamp(0))
}

pub fn signed_webhook_at(body: &str, timestamp: &str) -> Request<Body> {
    let signature = sign(SANDBOX_SECRET.as_bytes(), timestamp, body.as_bytes()).unwrap();
    webhook_with_signature(body, &signature, timestamp)
}

pub fn webhook_with_signature(body: &str, signature: &str, timestamp: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/gateway")
        .header("x-webhook-signature", signature)
        .header("x-webhook-timestamp", timestamp)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn callback(query: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/billing/callback?{}", query))
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}
