//! Integration tests for recurring renewals.
//!
//! Exercises the scheduler through the shared application state and the
//! `/api/billing/recurring/run` endpoint.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};

use common::{json_body, Harness};
use mandate_billing::application::handlers::billing::ChargeStatus;
use mandate_billing::domain::billing::{
    BillingFrequency, InvoiceStatus, Mandate, MandateStatus, NewMandate, Subscription,
};
use mandate_billing::domain::foundation::{ExternalRef, PlanId, Timestamp, UserId};
use mandate_billing::ports::{BillingNotification, ChargeOutcome};

/// Active mandate whose monthly period ends one day after `now`.
fn due_tomorrow(h: &Harness, now: Timestamp) -> Mandate {
    let mandate = h.insert_active_mandate("m1", "u1");
    h.store
        .insert_subscription(Subscription::for_activation(&mandate, now.add_days(-29)));
    mandate
}

// =============================================================================
// Invoice append-only
// =============================================================================

#[tokio::test]
async fn every_charge_appends_one_invoice_and_only_successes_extend() {
    let h = Harness::new();
    let t0 = Timestamp::now();
    due_tomorrow(&h, t0);
    let scheduler = h.state.recurring_billing.clone();

    let first = scheduler.run(t0).await.unwrap();
    h.gateway.push_charge(Ok(ChargeOutcome::Declined {
        transaction_id: "txn_declined".to_string(),
        reason: "insufficient funds".to_string(),
    }));
    let second = scheduler.run(t0.add_days(30)).await.unwrap();
    let third = scheduler.run(t0.add_days(31)).await.unwrap();

    assert_eq!(first.count(ChargeStatus::Paid), 1);
    assert_eq!(second.count(ChargeStatus::Failed), 1);
    assert_eq!(third.count(ChargeStatus::Paid), 1);

    let statuses: Vec<InvoiceStatus> = h.store.invoices().iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![InvoiceStatus::Paid, InvoiceStatus::Failed, InvoiceStatus::Paid]
    );
    assert_eq!(h.store.subscriptions()[0].end_date, t0.add_days(61));
}

#[tokio::test]
async fn declined_charge_leaves_end_date_and_notifies() {
    let h = Harness::new();
    let t0 = Timestamp::now();
    due_tomorrow(&h, t0);
    h.gateway.push_charge(Ok(ChargeOutcome::Declined {
        transaction_id: "txn_1".to_string(),
        reason: "mandate revoked".to_string(),
    }));

    h.state.recurring_billing.run(t0).await.unwrap();

    assert_eq!(h.store.subscriptions()[0].end_date, t0.add_days(1));
    let invoices = h.store.invoices();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].failure_reason.as_deref(), Some("mandate revoked"));
    assert!(h
        .notifier
        .sent()
        .iter()
        .any(|n| matches!(n, BillingNotification::RenewalChargeFailed { .. })));
}

#[tokio::test]
async fn subscription_not_yet_due_is_skipped() {
    let h = Harness::new();
    let t0 = Timestamp::now();
    let mandate = h.insert_active_mandate("m1", "u1");
    h.store
        .insert_subscription(Subscription::for_activation(&mandate, t0));

    let report = h.state.recurring_billing.run(t0).await.unwrap();

    assert_eq!(report.count(ChargeStatus::Skipped), 1);
    assert!(h.store.invoices().is_empty());
    assert_eq!(h.gateway.calls_to("charge_mandate"), 0);
}

#[tokio::test]
async fn pending_mandates_are_not_charged() {
    let h = Harness::new();
    h.insert_pending_mandate("m1", "u1");

    let report = h.state.recurring_billing.run(Timestamp::now()).await.unwrap();

    assert!(report.results.is_empty());
    assert_eq!(h.store.mandate("m1").unwrap().status, MandateStatus::Pending);
}

// =============================================================================
// Period computation
// =============================================================================

#[test]
fn yearly_period_is_365_days() {
    let now = Timestamp::now();
    let mut mandate = Mandate::pending(
        NewMandate {
            external_ref: ExternalRef::new("y1").unwrap(),
            user_id: UserId::new("u1").unwrap(),
            plan_id: PlanId::new("pro").unwrap(),
            frequency: BillingFrequency::Yearly,
            payment_method: "upi".to_string(),
            max_amount: 1_000_000,
            currency: "INR".to_string(),
        },
        now,
    )
    .unwrap();
    mandate.status = MandateStatus::Active;

    let subscription = Subscription::for_activation(&mandate, now);

    assert_eq!(subscription.end_date, now.add_days(365));
}

// =============================================================================
// Endpoint
// =============================================================================

#[tokio::test]
async fn endpoint_reports_each_mandate() {
    let h = Harness::new();
    due_tomorrow(&h, Timestamp::now());
    let request = Request::builder()
        .method("POST")
        .uri("/api/billing/recurring/run")
        .body(Body::empty())
        .unwrap();

    let response = h.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["charge"], "paid");
    assert!(results[0]["mandateId"].is_string());
}
