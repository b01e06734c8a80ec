//! Shared fixtures for billing handler tests.

use std::sync::Arc;

use secrecy::SecretString;

use crate::adapters::gateway::MockPaymentGateway;
use crate::adapters::memory::InMemoryBillingStore;
use crate::adapters::notify::RecordingNotifier;
use crate::config::GatewayConfig;
use crate::domain::billing::{
    BillingFrequency, Mandate, MandateStatus, NewMandate, PlanPrice, ProgramPrice,
};
use crate::domain::foundation::{ExternalRef, PlanId, ProductId, Timestamp, UserId};

use super::{
    CallbackUrls, GatewayConfigResolver, MandateLifecycle, PaymentReconciler,
    SubscriptionActivator,
};

pub const PLAN: &str = "pro";
pub const PROGRAM: &str = "masterclass";

pub fn gateway_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.sandbox.client_id = "sandbox-id".to_string();
    config.sandbox.client_secret = SecretString::new("sandbox-secret".to_string());
    config.production.client_id = "production-id".to_string();
    config.production.client_secret = SecretString::new("production-secret".to_string());
    config
}

pub fn callback_urls() -> CallbackUrls {
    CallbackUrls::new(
        "https://api.example.com/api/billing/callback",
        "https://api.example.com/api/webhooks/gateway",
    )
}

pub fn plan_price(base_amount: i64, tax_amount: i64) -> PlanPrice {
    PlanPrice {
        plan_id: PlanId::new(PLAN).unwrap(),
        base_amount,
        tax_amount,
        currency: "INR".to_string(),
    }
}

pub fn pending_mandate(reference: &str, user: &str) -> Mandate {
    Mandate::pending(
        NewMandate {
            external_ref: ExternalRef::new(reference).unwrap(),
            user_id: UserId::new(user).unwrap(),
            plan_id: PlanId::new(PLAN).unwrap(),
            frequency: BillingFrequency::Monthly,
            payment_method: "upi".to_string(),
            max_amount: 100_000,
            currency: "INR".to_string(),
        },
        Timestamp::now(),
    )
    .unwrap()
}

pub fn active_mandate(reference: &str, user: &str) -> Mandate {
    let mut mandate = pending_mandate(reference, user);
    mandate.status = MandateStatus::Active;
    mandate
}

/// Store, gateway and notifier wired into the reconciliation core.
pub struct Fixture {
    pub store: Arc<InMemoryBillingStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub resolver: Arc<GatewayConfigResolver>,
    pub activator: Arc<SubscriptionActivator>,
    pub reconciler: Arc<PaymentReconciler>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_notifier(Arc::new(RecordingNotifier::new()))
    }

    pub fn with_notifier(notifier: Arc<RecordingNotifier>) -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        store.seed_plan(plan_price(49_900, 8_982));
        store.seed_program(ProgramPrice {
            product_id: ProductId::new(PROGRAM).unwrap(),
            amount: 99_900,
            currency: "INR".to_string(),
        });

        let gateway = Arc::new(MockPaymentGateway::new());
        let resolver = Arc::new(GatewayConfigResolver::new(store.clone(), gateway_config()));
        let lifecycle = Arc::new(MandateLifecycle::new(store.clone()));
        let activator = Arc::new(SubscriptionActivator::new(store.clone(), notifier.clone()));
        let reconciler = Arc::new(PaymentReconciler::new(
            lifecycle,
            activator.clone(),
            store.clone(),
            notifier.clone(),
        ));

        Self {
            store,
            gateway,
            notifier,
            resolver,
            activator,
            reconciler,
        }
    }
}
