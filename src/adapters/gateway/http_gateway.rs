//! REST payment gateway adapter.
//!
//! Implements `PaymentGateway` over the gateway's JSON API. Every call is
//! authenticated with the credentials of the [`GatewayContext`] it is
//! given, so the active environment is whatever the resolver picked for
//! that request.
//!
//! # Headers
//!
//! - `x-client-id` / `x-client-secret` - environment credentials
//! - `x-api-version` - pinned API version from configuration
//! - `x-idempotency-key` - on creates and charges

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;

use crate::domain::foundation::{ExternalRef, OrderId};
use crate::ports::{
    ChargeOutcome, ChargeRequest, CheckoutOrder, CreateMandateRequest, CreateOrderRequest,
    GatewayContext, MandateAuthorization, OrderSnapshot, PaymentError, PaymentErrorCode,
    PaymentGateway,
};

use super::wire_types::{
    major_units, ApiErrorBody, ChargeBody, ChargeResponse, CreateOrderBody,
    CreateSubscriptionBody, CustomerDetails, OrderMeta, OrderResponse, OrderTagsBody,
    PlanDetails, SubscriptionMeta, SubscriptionResponse, SubscriptionTags,
};

const SUCCESS_PAYMENT_STATUS: &str = "SUCCESS";

/// Gateway adapter backed by `reqwest`.
pub struct HttpPaymentGateway {
    http_client: reqwest::Client,
}

impl HttpPaymentGateway {
    /// Creates an adapter whose calls give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    fn authorized(&self, builder: RequestBuilder, ctx: &GatewayContext) -> RequestBuilder {
        builder
            .header("x-client-id", &ctx.credential_id)
            .header("x-client-secret", ctx.secret.expose_secret())
            .header("x-api-version", &ctx.api_version)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, PaymentError> {
        let response = builder.send().await.map_err(map_transport_error)?;
        let response = check_status(response, operation).await?;
        response.json::<T>().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse {} response: {}", operation, e))
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_mandate(
        &self,
        ctx: &GatewayContext,
        request: CreateMandateRequest,
    ) -> Result<MandateAuthorization, PaymentError> {
        let url = format!("{}/subscriptions", ctx.base_url);
        let body = CreateSubscriptionBody {
            subscription_id: request.external_ref.to_string(),
            customer_details: CustomerDetails {
                customer_id: request.user_id.to_string(),
            },
            plan_details: PlanDetails {
                plan_name: request.plan_id.to_string(),
                plan_type: "ON_DEMAND",
                plan_max_amount: major_units(request.max_amount),
                plan_currency: request.currency.clone(),
                plan_interval_type: request.frequency.as_str(),
            },
            subscription_meta: SubscriptionMeta {
                return_url: request.return_url.clone(),
                notify_url: request.notify_url.clone(),
            },
            subscription_tags: SubscriptionTags {
                mandate_ref: request.external_ref.to_string(),
                mandate_id: request.mandate_id.to_string(),
            },
        };

        let builder = self
            .authorized(self.http_client.post(&url), ctx)
            .header("x-idempotency-key", request.mandate_id.to_string())
            .json(&body);
        let created: SubscriptionResponse = self.send(builder, "create_mandate").await?;

        tracing::info!(
            mode = %ctx.mode,
            mandate_ref = %created.subscription_id,
            "Gateway mandate created"
        );

        let external_ref = ExternalRef::new(created.subscription_id)
            .map_err(|e| PaymentError::invalid_response(e.to_string()))?;
        let payment_method = created
            .authorization_details
            .and_then(|d| d.payment_method)
            .unwrap_or_else(|| "upi".to_string());

        Ok(MandateAuthorization {
            external_ref,
            authorization_url: created.authorization_link,
            payment_method,
        })
    }

    async fn create_order(
        &self,
        ctx: &GatewayContext,
        request: CreateOrderRequest,
    ) -> Result<CheckoutOrder, PaymentError> {
        let url = format!("{}/orders", ctx.base_url);
        let body = CreateOrderBody {
            order_id: format!("order_{}", request.purchase_id.as_uuid().simple()),
            order_amount: major_units(request.amount),
            order_currency: request.currency.clone(),
            customer_details: CustomerDetails {
                customer_id: request.user_id.to_string(),
            },
            order_meta: OrderMeta {
                return_url: request.return_url.clone(),
                notify_url: request.notify_url.clone(),
            },
            order_tags: OrderTagsBody {
                purchase_id: request.purchase_id.to_string(),
            },
        };

        let builder = self
            .authorized(self.http_client.post(&url), ctx)
            .header("x-idempotency-key", request.purchase_id.to_string())
            .json(&body);
        let created: OrderResponse = self.send(builder, "create_order").await?;

        tracing::info!(mode = %ctx.mode, order_id = %created.order_id, "Gateway order created");

        let order_id = OrderId::new(created.order_id)
            .map_err(|e| PaymentError::invalid_response(e.to_string()))?;
        Ok(CheckoutOrder {
            order_id,
            payment_session_id: created.payment_session_id,
        })
    }

    async fn charge_mandate(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeOutcome, PaymentError> {
        let url = format!("{}/subscriptions/pay", ctx.base_url);
        let body = ChargeBody {
            subscription_id: request.external_ref.to_string(),
            payment_id: request.charge_id.clone(),
            payment_amount: major_units(request.amount),
            payment_currency: request.currency.clone(),
            payment_type: "CHARGE",
            payment_method: request.payment_method.clone(),
        };

        let builder = self
            .authorized(self.http_client.post(&url), ctx)
            .header("x-idempotency-key", &request.charge_id)
            .json(&body);
        let charged: ChargeResponse = self.send(builder, "charge_mandate").await?;

        let transaction_id = charged.transaction_id(&request.charge_id);
        let status = charged
            .payment_status
            .as_deref()
            .map(str::to_ascii_uppercase)
            .unwrap_or_default();

        if status == SUCCESS_PAYMENT_STATUS {
            return Ok(ChargeOutcome::Succeeded { transaction_id });
        }

        // Anything short of SUCCESS at response time is recorded as a decline.
        let reason = charged
            .failure_details
            .and_then(|d| d.failure_reason)
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| {
                if status.is_empty() {
                    "unknown".to_string()
                } else {
                    status.to_ascii_lowercase()
                }
            });
        Ok(ChargeOutcome::Declined {
            transaction_id,
            reason,
        })
    }

    async fn get_order(
        &self,
        ctx: &GatewayContext,
        order_id: &OrderId,
    ) -> Result<OrderSnapshot, PaymentError> {
        let url = format!("{}/orders/{}", ctx.base_url, order_id);
        let builder = self.authorized(self.http_client.get(&url), ctx);
        let order: OrderResponse = self.send(builder, "get_order").await?;

        Ok(OrderSnapshot {
            order_id: order.order_id,
            order_status: order.order_status.unwrap_or_default(),
            order_note: order.order_note,
            payment_message: order.payment_message,
            error_description: order.error_details.and_then(|d| d.error_description),
            order_tags: order.order_tags,
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> PaymentError {
    if err.is_timeout() {
        PaymentError::timeout(err.to_string())
    } else {
        PaymentError::network(err.to_string())
    }
}

async fn check_status(response: Response, operation: &'static str) -> Result<Response, PaymentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    let message = body
        .message
        .unwrap_or_else(|| format!("{} returned {}", operation, status));
    tracing::error!(operation, status = status.as_u16(), error = %message, "Gateway call failed");

    let error = PaymentError::new(status_code(status), message);
    Err(match body.code {
        Some(code) => error.with_provider_code(code),
        None => error,
    })
}

fn status_code(status: StatusCode) -> PaymentErrorCode {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentErrorCode::AuthenticationError,
        StatusCode::NOT_FOUND => PaymentErrorCode::NotFound,
        StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PaymentErrorCode::Timeout,
        s if s.is_client_error() => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    }
}
