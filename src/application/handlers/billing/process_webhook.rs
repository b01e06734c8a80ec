//! ProcessWebhookHandler - Detached half of the webhook flow.
//!
//! Runs after the gateway has already been acknowledged, so every early
//! exit is a logged outcome rather than an error the sender would see.

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::domain::billing::{
    BillingError, GatewayWebhook, OrderOutcome, SignatureError, WebhookEventKind,
    WebhookSignatureVerifier,
};
use crate::ports::WebhookDelivery;

use super::{PaymentReconciler, Reconciliation};

/// What happened to one acknowledged delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Signature did not verify; dropped without any write.
    Rejected(SignatureError),
    /// Authentic but not parseable JSON.
    Malformed,
    /// No mandate reference or purchase id to act on.
    Uncorrelated { event_type: String },
    /// Event type the billing core does not act on.
    Ignored { event_type: String },
    Reconciled(Reconciliation),
}

pub struct ProcessWebhookHandler {
    verifier: WebhookSignatureVerifier,
    reconciler: Arc<PaymentReconciler>,
}

impl ProcessWebhookHandler {
    pub fn new(verifier: WebhookSignatureVerifier, reconciler: Arc<PaymentReconciler>) -> Self {
        Self {
            verifier,
            reconciler,
        }
    }

    /// # Errors
    ///
    /// Only reconciliation failures (unknown record, storage) are errors.
    pub async fn handle(&self, delivery: WebhookDelivery) -> Result<WebhookOutcome, BillingError> {
        if let Err(err) = self.verifier.verify(
            &delivery.raw_body,
            delivery.timestamp.as_deref(),
            delivery.signature.as_deref(),
            delivery.secret.expose_secret().as_bytes(),
            delivery.received_at,
        ) {
            tracing::warn!(error = %err, body_len = delivery.raw_body.len(), "Webhook signature rejected");
            return Ok(WebhookOutcome::Rejected(err));
        }

        let webhook = match GatewayWebhook::parse(&delivery.raw_body) {
            Ok(webhook) => webhook,
            Err(err) => {
                tracing::warn!(error = %err, "Webhook body is not a gateway event");
                return Ok(WebhookOutcome::Malformed);
            }
        };

        let order_id = webhook.order_id();
        let Some(correlation) = webhook.correlation() else {
            tracing::warn!(
                event_type = %webhook.event_type,
                order_id = ?order_id.as_ref().map(|o| o.as_str()),
                "Webhook has no correlation id"
            );
            return Ok(WebhookOutcome::Uncorrelated {
                event_type: webhook.event_type,
            });
        };

        let outcome = match webhook.kind() {
            WebhookEventKind::PaymentSucceeded => OrderOutcome::Paid,
            WebhookEventKind::PaymentFailed => OrderOutcome::Failed {
                reason: webhook
                    .failure_reason()
                    .unwrap_or_else(|| webhook.event_type.to_ascii_lowercase()),
            },
            WebhookEventKind::Other => {
                tracing::debug!(event_type = %webhook.event_type, "Webhook ignored");
                return Ok(WebhookOutcome::Ignored {
                    event_type: webhook.event_type,
                });
            }
        };

        tracing::info!(
            event_type = %webhook.event_type,
            order_id = ?order_id.as_ref().map(|o| o.as_str()),
            payment_id = ?webhook.payment_id(),
            correlation = ?correlation,
            "Processing webhook"
        );

        let reconciliation = self.reconciler.reconcile(&correlation, &outcome).await?;
        Ok(WebhookOutcome::Reconciled(reconciliation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::{pending_mandate, Fixture};
    use crate::domain::billing::{sign, MandateStatus};
    use crate::domain::foundation::{Timestamp, UserId};
    use secrecy::SecretString;

    const SECRET: &str = "sandbox-secret";
    const TIMESTAMP: &str = "1700000000";

    fn handler(fx: &Fixture) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(WebhookSignatureVerifier::new(), fx.reconciler.clone())
    }

    fn delivery(body: &str, signature: Option<String>) -> WebhookDelivery {
        WebhookDelivery {
            raw_body: body.as_bytes().to_vec(),
            signature,
            timestamp: Some(TIMESTAMP.to_string()),
            secret: SecretString::new(SECRET.to_string()),
            received_at: Timestamp::now(),
        }
    }

    fn signed(body: &str) -> WebhookDelivery {
        let signature = sign(SECRET.as_bytes(), TIMESTAMP, body.as_bytes()).unwrap();
        delivery(body, Some(signature))
    }

    fn mandate_event(event_type: &str, reference: &str) -> String {
        format!(
            r#"{{"type":"{}","event_time":"2024-01-01T00:00:00Z","data":{{"order":{{"order_id":"o1","order_tags":{{"mandate_ref":"{}"}}}},"payment":{{"cf_payment_id":42,"payment_message":"Insufficient balance"}}}}}}"#,
            event_type, reference
        )
    }

    #[tokio::test]
    async fn authentic_success_activates_mandate() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));

        let outcome = handler(&fx)
            .handle(signed(&mandate_event("PAYMENT_SUCCESS_WEBHOOK", "m1")))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Reconciled(_)));
        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Active);
        assert!(fx.store.user_paid(&UserId::new("user-1").unwrap()));
    }

    #[tokio::test]
    async fn forged_signature_writes_nothing() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));
        let body = mandate_event("PAYMENT_SUCCESS_WEBHOOK", "m1");
        let forged = sign(b"attacker", TIMESTAMP, body.as_bytes()).unwrap();

        let outcome = handler(&fx).handle(delivery(&body, Some(forged))).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Rejected(SignatureError::Mismatch));
        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Pending);
        assert_eq!(fx.store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let fx = Fixture::new();
        let body = mandate_event("PAYMENT_SUCCESS_WEBHOOK", "m1");

        let outcome = handler(&fx).handle(delivery(&body, None)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Rejected(SignatureError::MissingSignature)
        );
    }

    #[tokio::test]
    async fn failure_event_marks_mandate_failed() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));

        handler(&fx)
            .handle(signed(&mandate_event("SUBSCRIPTION_AUTH_FAILED_WEBHOOK", "m1")))
            .await
            .unwrap();

        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Failed);
    }

    #[tokio::test]
    async fn unrelated_event_is_ignored() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));

        let outcome = handler(&fx)
            .handle(signed(&mandate_event("REFUND_STATUS_WEBHOOK", "m1")))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Pending);
    }

    #[tokio::test]
    async fn event_without_correlation_is_dropped() {
        let fx = Fixture::new();
        let body = r#"{"type":"PAYMENT_SUCCESS_WEBHOOK","data":{"order":{"order_id":"o1"}}}"#;

        let outcome = handler(&fx).handle(signed(body)).await.unwrap();

        assert!(matches!(outcome, WebhookOutcome::Uncorrelated { .. }));
    }

    #[tokio::test]
    async fn authentic_garbage_is_malformed() {
        let fx = Fixture::new();

        let outcome = handler(&fx).handle(signed("not json")).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Malformed);
    }

    #[tokio::test]
    async fn subscription_id_correlates_to_mandate() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("sub_77", "user-1"));
        let body = r#"{"type":"SUBSCRIPTION_AUTH_SUCCESS_WEBHOOK","data":{"subscription_details":{"subscription_id":"sub_77"}}}"#;

        handler(&fx).handle(signed(body)).await.unwrap();

        assert_eq!(
            fx.store.mandate("sub_77").unwrap().status,
            MandateStatus::Active
        );
    }
}
