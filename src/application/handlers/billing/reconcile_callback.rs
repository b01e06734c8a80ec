//! ReconcileCallbackHandler - Browser return after the hosted payment page.
//!
//! The query string is untrusted; the verdict always comes from a
//! server-side "verify order" call made with our own credentials.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{BillingError, Correlation, OrderOutcome};
use crate::domain::foundation::OrderId;
use crate::ports::{GatewayContext, OrderSnapshot, PaymentError, PaymentErrorCode, PaymentGateway};

use super::{GatewayConfigResolver, PaymentReconciler};

/// One try plus one retry on timeout or network failure.
const MAX_VERIFY_ATTEMPTS: u32 = 2;

pub const REASON_MISSING_IDS: &str = "missing_ids";
pub const REASON_SERVER_ERROR: &str = "server_error";
pub const REASON_ORDER_MISMATCH: &str = "order_mismatch";

/// Callback query parameters, unvalidated.
#[derive(Debug, Clone, Default)]
pub struct CallbackQuery {
    pub order_id: Option<String>,
    pub mandate_ref: Option<String>,
    pub purchase_id: Option<String>,
}

/// Where the browser should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    Succeeded {
        order_id: OrderId,
    },
    Failed {
        reason: String,
        order_id: Option<OrderId>,
    },
}

impl CallbackResult {
    fn failed(reason: impl Into<String>, order_id: Option<OrderId>) -> Self {
        CallbackResult::Failed {
            reason: reason.into(),
            order_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallbackResult::Succeeded { .. })
    }
}

pub struct ReconcileCallbackHandler {
    resolver: Arc<GatewayConfigResolver>,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<PaymentReconciler>,
    verify_timeout: Duration,
}

impl ReconcileCallbackHandler {
    pub fn new(
        resolver: Arc<GatewayConfigResolver>,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: Arc<PaymentReconciler>,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            gateway,
            reconciler,
            verify_timeout,
        }
    }

    /// Never fails; every error becomes a failure redirect.
    pub async fn handle(&self, query: CallbackQuery) -> CallbackResult {
        let order_id = query
            .order_id
            .as_deref()
            .and_then(|id| OrderId::new(id.trim()).ok());
        let correlation =
            Correlation::from_parts(query.mandate_ref.as_deref(), query.purchase_id.as_deref());

        let (Some(order_id), Some(correlation)) = (order_id.clone(), correlation) else {
            tracing::warn!(?query, "Callback without order or correlation id");
            return CallbackResult::failed(REASON_MISSING_IDS, order_id);
        };

        match self.reconcile(&order_id, &correlation).await {
            Ok(OrderOutcome::Paid) => CallbackResult::Succeeded { order_id },
            Ok(OrderOutcome::Failed { reason }) => CallbackResult::failed(reason, Some(order_id)),
            Err(err) => {
                tracing::error!(
                    order_id = %order_id,
                    correlation = ?correlation,
                    error = %err,
                    "Callback reconciliation failed"
                );
                CallbackResult::failed(REASON_SERVER_ERROR, Some(order_id))
            }
        }
    }

    async fn reconcile(
        &self,
        order_id: &OrderId,
        correlation: &Correlation,
    ) -> Result<OrderOutcome, BillingError> {
        let ctx = self.resolver.resolve().await?;
        let snapshot = self.verify_order(&ctx, order_id).await?;

        let belongs = snapshot.order_id == order_id.as_str()
            && self
                .reconciler
                .order_belongs_to(correlation, order_id, snapshot.order_tags.as_ref())
                .await?;
        if !belongs {
            tracing::warn!(
                order_id = %order_id,
                correlation = ?correlation,
                order_tags = ?snapshot.order_tags,
                "Callback order does not belong to the named record"
            );
            return Ok(OrderOutcome::Failed {
                reason: REASON_ORDER_MISMATCH.to_string(),
            });
        }

        let outcome = snapshot.outcome();

        let reconciliation = self.reconciler.reconcile(correlation, &outcome).await?;
        tracing::info!(
            order_id = %order_id,
            order_status = %snapshot.order_status,
            applied = reconciliation.applied(),
            "Callback reconciled"
        );
        Ok(outcome)
    }

    async fn verify_order(
        &self,
        ctx: &GatewayContext,
        order_id: &OrderId,
    ) -> Result<OrderSnapshot, PaymentError> {
        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.verify_timeout, self.gateway.get_order(ctx, order_id))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PaymentError::timeout(format!(
                        "verify order took longer than {:?}",
                        self.verify_timeout
                    ))),
                };

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if attempt < MAX_VERIFY_ATTEMPTS && is_transient(&err) => {
                    tracing::warn!(order_id = %order_id, attempt, error = %err, "Retrying verify order");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_transient(err: &PaymentError) -> bool {
    matches!(
        err.code,
        PaymentErrorCode::Timeout | PaymentErrorCode::NetworkError
    )
}
