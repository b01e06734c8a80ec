//! HTTP handlers for billing endpoints.
//!
//! The webhook and callback endpoints face the gateway and the user's
//! browser; they never answer with an error. The remaining endpoints
//! map `BillingError` onto JSON error responses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Json, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use url::Url;

use crate::application::handlers::billing::{
    AcceptWebhookCommand, AcceptWebhookHandler, CallbackQuery, CallbackResult, CallbackUrls,
    CreatePurchaseCommand, CreatePurchaseHandler, GatewayConfigResolver, GetSubscriptionHandler,
    GetSubscriptionQuery, InitiateMandateCommand, InitiateMandateHandler, MandateLifecycle,
    PaymentReconciler, ProcessWebhookHandler, ReconcileCallbackHandler, RecurringBillingConfig,
    RecurringBillingScheduler, SubscriptionActivator, REASON_MISSING_IDS,
};
use crate::config::GatewayConfig;
use crate::domain::billing::{BillingError, WebhookSignatureVerifier};
use crate::domain::foundation::{
    ErrorCode, PlanId, ProductId, Timestamp, UserId, ValidationError,
};

use crate::ports::{
    BillingNotifier, GatewayConfigStore, MandateRepository, PaymentGateway, PriceCatalog,
    PurchaseRepository, SubscriptionStore, WebhookQueue,
};

use super::dto::{
    to_minor_units, CallbackParams, CreatePurchaseRequest, ErrorResponse,
    InitiateMandateRequest, MandateResponse, PurchaseResponse, RecurringRunResponse, WebhookAck,
};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Browser landing pages after the callback.
#[derive(Debug, Clone)]
pub struct RedirectTargets {
    success: Url,
    failure: Url,
}

impl RedirectTargets {
    pub fn new(success_url: &str, failure_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            success: Url::parse(success_url)?,
            failure: Url::parse(failure_url)?,
        })
    }

    /// Success page with `orderId`, or failure page with `reason` and
    /// `orderId` when known.
    pub fn location(&self, result: &CallbackResult) -> String {
        match result {
            CallbackResult::Succeeded { order_id } => {
                let mut url = self.success.clone();
                url.query_pairs_mut().append_pair("orderId", order_id.as_str());
                url.into()
            }
            CallbackResult::Failed { reason, order_id } => {
                let mut url = self.failure.clone();
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs.append_pair("reason", reason);
                    if let Some(order_id) = order_id {
                        pairs.append_pair("orderId", order_id.as_str());
                    }
                }
                url.into()
            }
        }
    }
}

/// Storage, gateway and queue implementations behind the billing routes.
#[derive(Clone)]
pub struct BillingPorts {
    pub mandates: Arc<dyn MandateRepository>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub catalog: Arc<dyn PriceCatalog>,
    pub gateway_config: Arc<dyn GatewayConfigStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn BillingNotifier>,
    pub queue: Arc<dyn WebhookQueue>,
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub gateway: GatewayConfig,
    pub urls: CallbackUrls,
    pub redirects: RedirectTargets,
    pub cron_secret: Option<SecretString>,
    pub recurring: RecurringBillingConfig,
    /// Bound on each callback verify-order attempt.
    pub verify_timeout: Duration,
}

/// Shared state for billing routes. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub accept_webhook: Arc<AcceptWebhookHandler>,
    pub process_webhook: Arc<ProcessWebhookHandler>,
    pub reconcile_callback: Arc<ReconcileCallbackHandler>,
    pub recurring_billing: Arc<RecurringBillingScheduler>,
    pub initiate_mandate: Arc<InitiateMandateHandler>,
    pub create_purchase: Arc<CreatePurchaseHandler>,
    pub get_subscription: Arc<GetSubscriptionHandler>,
    pub redirects: RedirectTargets,
    /// When unset the recurring trigger is open; meant for local runs.
    pub cron_secret: Option<SecretString>,
}

impl BillingAppState {
    /// Wires every billing handler around one reconciliation core, so the
    /// webhook worker, the callback and the scheduler share it.
    pub fn new(ports: BillingPorts, settings: BillingSettings) -> Self {
        let resolver = Arc::new(GatewayConfigResolver::new(
            ports.gateway_config.clone(),
            settings.gateway.clone(),
        ));
        let lifecycle = Arc::new(MandateLifecycle::new(ports.mandates.clone()));
        let activator = Arc::new(SubscriptionActivator::new(
            ports.subscriptions.clone(),
            ports.notifier.clone(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            lifecycle,
            activator.clone(),
            ports.purchases.clone(),
            ports.notifier.clone(),
        ));
        let verifier =
            WebhookSignatureVerifier::new().with_max_age(resolver.webhook_max_age_secs());

        Self {
            accept_webhook: Arc::new(AcceptWebhookHandler::new(
                resolver.clone(),
                ports.queue.clone(),
            )),
            process_webhook: Arc::new(ProcessWebhookHandler::new(verifier, reconciler.clone())),
            reconcile_callback: Arc::new(ReconcileCallbackHandler::new(
                resolver.clone(),
                ports.gateway.clone(),
                reconciler,
                settings.verify_timeout,
            )),
            recurring_billing: Arc::new(RecurringBillingScheduler::new(
                ports.mandates.clone(),
                ports.subscriptions.clone(),
                ports.catalog.clone(),
                ports.gateway.clone(),
                resolver.clone(),
                activator,
                ports.notifier.clone(),
                settings.recurring,
            )),
            initiate_mandate: Arc::new(InitiateMandateHandler::new(
                ports.mandates.clone(),
                ports.catalog.clone(),
                ports.gateway.clone(),
                resolver.clone(),
                settings.urls.clone(),
            )),
            create_purchase: Arc::new(CreatePurchaseHandler::new(
                ports.purchases.clone(),
                ports.catalog.clone(),
                ports.gateway.clone(),
                resolver,
                settings.urls,
            )),
            get_subscription: Arc::new(GetSubscriptionHandler::new(ports.subscriptions)),
            redirects: settings.redirects,
            cron_secret: settings.cron_secret,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity set by the upstream auth proxy in `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Gateway-facing endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/gateway - Acknowledge, then process on the queue
///
/// Always `200 {"ok":true}`: a rejected or failed delivery must not be
/// distinguishable by the caller, and must not trigger gateway retries.
pub async fn handle_gateway_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let cmd = AcceptWebhookCommand {
        raw_body: body.to_vec(),
        signature: header_value(&headers, SIGNATURE_HEADER),
        timestamp: header_value(&headers, TIMESTAMP_HEADER),
    };

    if let Err(err) = state.accept_webhook.handle(cmd).await {
        tracing::error!(error = %err, body_len = body.len(), "Webhook could not be queued");
    }

    (StatusCode::OK, Json(WebhookAck::ok()))
}

/// GET /api/billing/callback - Browser return from the hosted page
pub async fn handle_callback(
    State(state): State<BillingAppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Redirect {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Unreadable callback query");
            let result = CallbackResult::Failed {
                reason: REASON_MISSING_IDS.to_string(),
                order_id: None,
            };
            return Redirect::to(&state.redirects.location(&result));
        }
    };
    let query = CallbackQuery {
        order_id: params.order_id,
        mandate_ref: params.mandate_ref,
        purchase_id: params.purchase_id,
    };

    let result = state.reconcile_callback.handle(query).await;
    Redirect::to(&state.redirects.location(&result))
}

/// POST /api/billing/recurring/run - One renewal pass, for an external cron
pub async fn run_recurring_billing(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
) -> Response {
    if let Some(expected) = &state.cron_secret {
        let presented = header_value(&headers, CRON_SECRET_HEADER).unwrap_or_default();
        let matches: bool = presented
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes())
            .into();
        if !matches {
            tracing::warn!("Recurring run rejected: bad cron secret");
            let error = ErrorResponse::new("UNAUTHORIZED", "Invalid cron secret");
            return (StatusCode::UNAUTHORIZED, Json(error)).into_response();
        }
    }

    match state.recurring_billing.run(Timestamp::now()).await {
        Ok(report) => Json(RecurringRunResponse::from(report)).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Recurring billing run failed to start");
            let error = ErrorResponse::new(err.code().to_string(), err.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/mandates - Start a mandate authorization
pub async fn initiate_mandate(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<InitiateMandateRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let max_amount = request
        .max_amount
        .map(|amount| to_minor_units("maxAmount", amount))
        .transpose()?;

    let cmd = InitiateMandateCommand {
        user_id: user.user_id,
        plan_id: PlanId::new(request.plan_id)?,
        frequency: request.frequency,
        max_amount,
    };

    let result = state.initiate_mandate.handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(MandateResponse::from(result))))
}

/// POST /api/billing/purchases - Checkout for a one-time program
pub async fn create_purchase(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreatePurchaseRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CreatePurchaseCommand {
        user_id: user.user_id,
        product_id: ProductId::new(request.product_id)?,
    };

    let result = state.create_purchase.handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(PurchaseResponse::from(result))))
}

/// GET /api/billing/subscription - Current subscription, or `null`
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let view = state
        .get_subscription
        .handle(GetSubscriptionQuery {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(view))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<ValidationError> for BillingApiError {
    fn from(err: ValidationError) -> Self {
        Self(BillingError::Validation(err))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = match self.0.code() {
            ErrorCode::MandateNotFound | ErrorCode::PurchaseNotFound | ErrorCode::PlanNotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::GatewayError => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }

        let message = match &self.0 {
            BillingError::Infrastructure(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse::new(self.0.code().to_string(), message);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::OrderId;

    fn targets() -> RedirectTargets {
        RedirectTargets::new(
            "https://app.example.com/payment/success",
            "https://app.example.com/payment/failure",
        )
        .unwrap()
    }

    #[test]
    fn success_location_carries_order_id() {
        let location = targets().location(&CallbackResult::Succeeded {
            order_id: OrderId::new("order_1").unwrap(),
        });
        assert_eq!(
            location,
            "https://app.example.com/payment/success?orderId=order_1"
        );
    }

    #[test]
    fn failure_location_encodes_reason() {
        let location = targets().location(&CallbackResult::Failed {
            reason: "card declined".to_string(),
            order_id: Some(OrderId::new("order_1").unwrap()),
        });
        assert_eq!(
            location,
            "https://app.example.com/payment/failure?reason=card+declined&orderId=order_1"
        );
    }

    #[test]
    fn failure_without_order_omits_it() {
        let location = targets().location(&CallbackResult::Failed {
            reason: "missing_ids".to_string(),
            order_id: None,
        });
        assert_eq!(
            location,
            "https://app.example.com/payment/failure?reason=missing_ids"
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = BillingApiError::from(BillingError::plan_not_found("gold")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn gateway_error_maps_to_502() {
        let response = BillingApiError::from(BillingError::Gateway {
            message: "timeout".to_string(),
            retryable: true,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
