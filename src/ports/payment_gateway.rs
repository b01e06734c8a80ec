//! Payment gateway port.
//!
//! Every call carries a [`GatewayContext`] resolved for that request,
//! so an operator flipping sandbox/production takes effect without a
//! restart. Implementations must send the context's API version header
//! on every call.
//!
//! # Design
//!
//! - **Decisions vs. failures**: a declined charge is a `ChargeOutcome`,
//!   not an error. `PaymentError` means the gateway could not be reached
//!   or answered with something unusable.
//! - **Idempotent creates**: callers supply the idempotency key.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingError, BillingFrequency, Correlation, GatewayMode, OrderOutcome, OrderTags,
};
use crate::domain::foundation::{
    DomainError, ErrorCode, ExternalRef, MandateId, OrderId, PlanId, PurchaseId, UserId,
};

/// Environment-scoped connection details for one request.
#[derive(Debug, Clone)]
pub struct GatewayContext {
    pub mode: GatewayMode,
    pub base_url: String,
    pub credential_id: String,
    pub secret: SecretString,
    pub api_version: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a mandate authorization; the user completes it on the
    /// gateway's hosted page.
    async fn create_mandate(
        &self,
        ctx: &GatewayContext,
        request: CreateMandateRequest,
    ) -> Result<MandateAuthorization, PaymentError>;

    /// Creates a checkout order for a one-time purchase.
    async fn create_order(
        &self,
        ctx: &GatewayContext,
        request: CreateOrderRequest,
    ) -> Result<CheckoutOrder, PaymentError>;

    /// Charges an active mandate.
    async fn charge_mandate(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeOutcome, PaymentError>;

    /// Reads the gateway's view of an order ("verify order").
    async fn get_order(
        &self,
        ctx: &GatewayContext,
        order_id: &OrderId,
    ) -> Result<OrderSnapshot, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMandateRequest {
    pub mandate_id: MandateId,
    /// Merchant-chosen reference; the gateway echoes it back.
    pub external_ref: ExternalRef,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub frequency: BillingFrequency,
    pub max_amount: i64,
    pub currency: String,
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandateAuthorization {
    /// Gateway-assigned reference for the new mandate.
    pub external_ref: ExternalRef,
    pub authorization_url: Option<String>,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub purchase_id: PurchaseId,
    pub user_id: UserId,
    pub amount: i64,
    pub currency: String,
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOrder {
    pub order_id: OrderId,
    pub payment_session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Fresh per attempt; doubles as the gateway idempotency key.
    pub charge_id: String,
    pub external_ref: ExternalRef,
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
}

/// Gateway decision on a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { transaction_id: String },
    Declined { transaction_id: String, reason: String },
}

/// Gateway's view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub order_status: String,
    #[serde(default)]
    pub order_note: Option<String>,
    #[serde(default)]
    pub payment_message: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    /// Tags set when the order was created.
    #[serde(default)]
    pub order_tags: Option<OrderTags>,
}

impl OrderSnapshot {
    /// Local record the gateway says this order belongs to.
    pub fn correlation(&self) -> Option<Correlation> {
        self.order_tags.as_ref().and_then(OrderTags::correlation)
    }

    pub fn outcome(&self) -> OrderOutcome {
        OrderOutcome::from_status(
            &self.order_status,
            [
                self.payment_message.as_deref(),
                self.order_note.as_deref(),
                self.error_description.as_deref(),
            ],
        )
    }
}

/// Gateway communication error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentError {
    pub code: PaymentErrorCode,
    pub message: String,
    /// Gateway's own error code, when it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl PaymentError {
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidResponse, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        DomainError::new(ErrorCode::GatewayError, err.message)
            .with_detail("gateway_code", err.code.to_string())
    }
}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        BillingError::Gateway {
            message: err.to_string(),
            retryable: err.retryable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Connection could not be established or was reset.
    NetworkError,

    /// Request exceeded the configured deadline.
    Timeout,

    /// Credentials rejected.
    AuthenticationError,

    NotFound,

    RateLimitExceeded,

    /// Gateway rejected the request as malformed.
    InvalidRequest,

    /// Gateway answered with a body we could not interpret.
    InvalidResponse,

    /// Gateway reported an internal failure (5xx).
    ProviderError,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::Timeout
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::Timeout => "timeout",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::InvalidResponse => "invalid_response",
            PaymentErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
