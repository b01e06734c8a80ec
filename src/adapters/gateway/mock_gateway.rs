//! Mock payment gateway for tests and local runs.
//!
//! Supports:
//! - Scripted order statuses for "verify order"
//! - Scripted charge outcomes and injected errors
//! - Artificial latency (to exercise timeouts)
//! - Call tracking

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::billing::OrderTags;
use crate::domain::foundation::{ExternalRef, OrderId};
use crate::ports::{
    ChargeOutcome, ChargeRequest, CheckoutOrder, CreateMandateRequest, CreateOrderRequest,
    GatewayContext, MandateAuthorization, OrderSnapshot, PaymentError, PaymentGateway,
};

/// Mock payment gateway.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.set_mandate_order("order_1", "mnd_1", "PAID");
/// gateway.push_get_order_error(PaymentError::timeout("slow"));
/// gateway.push_charge(Ok(ChargeOutcome::Declined { .. }));
/// ```
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    orders: HashMap<String, OrderSnapshot>,
    get_order_errors: VecDeque<PaymentError>,
    get_order_delay: Option<Duration>,
    charges: VecDeque<Result<ChargeOutcome, PaymentError>>,
    next_mandate_ref: Option<String>,
    create_error: Option<PaymentError>,
    call_log: Vec<GatewayCall>,
}

/// Recorded gateway call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub method: &'static str,
    pub mode: String,
    pub argument: String,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, method: &'static str, ctx: &GatewayContext, argument: impl Into<String>) {
        self.state().call_log.push(GatewayCall {
            method,
            mode: ctx.mode.to_string(),
            argument: argument.into(),
        });
    }

    // ════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════

    /// Untagged order; it belongs to no local record.
    pub fn set_order_status(&self, order_id: &str, status: &str) {
        self.set_order(OrderSnapshot {
            order_id: order_id.to_string(),
            order_status: status.to_string(),
            ..Default::default()
        });
    }

    /// Order created for the mandate `reference`.
    pub fn set_mandate_order(&self, order_id: &str, reference: &str, status: &str) {
        self.set_order(OrderSnapshot {
            order_id: order_id.to_string(),
            order_status: status.to_string(),
            order_tags: Some(OrderTags {
                mandate_ref: Some(reference.to_string()),
                purchase_id: None,
            }),
            ..Default::default()
        });
    }

    /// Sets the status of an order previously returned by `create_order`.
    pub fn set_order_paid(&self, order_id: &str) {
        if let Some(order) = self.state().orders.get_mut(order_id) {
            order.order_status = "PAID".to_string();
        }
    }

    pub fn set_order(&self, snapshot: OrderSnapshot) {
        self.state().orders.insert(snapshot.order_id.clone(), snapshot);
    }

    /// Queues an error for the next `get_order` call.
    pub fn push_get_order_error(&self, error: PaymentError) {
        self.state().get_order_errors.push_back(error);
    }

    /// Delays every `get_order` call.
    pub fn set_get_order_delay(&self, delay: Duration) {
        self.state().get_order_delay = Some(delay);
    }

    /// Queues the outcome of the next `charge_mandate` call. Without a
    /// queued outcome charges succeed.
    pub fn push_charge(&self, outcome: Result<ChargeOutcome, PaymentError>) {
        self.state().charges.push_back(outcome);
    }

    /// Overrides the reference echoed by the next `create_mandate`.
    pub fn set_next_mandate_ref(&self, reference: &str) {
        self.state().next_mandate_ref = Some(reference.to_string());
    }

    /// Makes `create_mandate` and `create_order` fail.
    pub fn set_create_error(&self, error: PaymentError) {
        self.state().create_error = Some(error);
    }

    // ════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().call_log.clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_mandate(
        &self,
        ctx: &GatewayContext,
        request: CreateMandateRequest,
    ) -> Result<MandateAuthorization, PaymentError> {
        self.record("create_mandate", ctx, request.mandate_id.to_string());
        let mut state = self.state();
        if let Some(err) = state.create_error.clone() {
            return Err(err);
        }
        let external_ref = match state.next_mandate_ref.take() {
            Some(reference) => ExternalRef::new(reference)
                .map_err(|e| PaymentError::invalid_response(e.to_string()))?,
            None => request.external_ref,
        };

        Ok(MandateAuthorization {
            authorization_url: Some(format!("https://gateway.test/authorize/{}", external_ref)),
            external_ref,
            payment_method: "upi".to_string(),
        })
    }

    async fn create_order(
        &self,
        ctx: &GatewayContext,
        request: CreateOrderRequest,
    ) -> Result<CheckoutOrder, PaymentError> {
        self.record("create_order", ctx, request.purchase_id.to_string());
        if let Some(err) = self.state().create_error.clone() {
            return Err(err);
        }
        let order_id = OrderId::new(format!("order_{}", request.purchase_id.as_uuid().simple()))
            .map_err(|e| PaymentError::invalid_response(e.to_string()))?;
        self.set_order(OrderSnapshot {
            order_id: order_id.to_string(),
            order_status: "ACTIVE".to_string(),
            order_tags: Some(OrderTags::for_purchase(&request.purchase_id)),
            ..Default::default()
        });

        Ok(CheckoutOrder {
            order_id,
            payment_session_id: Some(format!("session_{}", Uuid::new_v4().simple())),
        })
    }

    async fn charge_mandate(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeOutcome, PaymentError> {
        self.record("charge_mandate", ctx, request.charge_id.clone());
        let scripted = self.state().charges.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(ChargeOutcome::Succeeded {
                transaction_id: format!("txn_{}", request.charge_id),
            })
        })
    }

    async fn get_order(
        &self,
        ctx: &GatewayContext,
        order_id: &OrderId,
    ) -> Result<OrderSnapshot, PaymentError> {
        self.record("get_order", ctx, order_id.as_str());
        let delay = self.state().get_order_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(err) = state.get_order_errors.pop_front() {
            return Err(err);
        }
        state
            .orders
            .get(order_id.as_str())
            .cloned()
            .ok_or_else(|| PaymentError::not_found("order"))
    }
}
