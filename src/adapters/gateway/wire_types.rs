//! Gateway REST payloads.
//!
//! Request bodies are built from port types; responses keep only the
//! fields the adapter maps back. Amounts travel as decimal major units.

use serde::{Deserialize, Serialize};

use crate::domain::billing::OrderTags;

/// Minor units (paise/cents) to the gateway's decimal major units.
pub fn major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

#[derive(Debug, Serialize)]
pub struct CustomerDetails {
    pub customer_id: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Orders
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct OrderMeta {
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Serialize)]
pub struct OrderTagsBody {
    pub purchase_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderBody {
    pub order_id: String,
    pub order_amount: f64,
    pub order_currency: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
    pub order_tags: OrderTagsBody,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub order_note: Option<String>,
    #[serde(default)]
    pub payment_session_id: Option<String>,
    #[serde(default)]
    pub payment_message: Option<String>,
    #[serde(default)]
    pub error_details: Option<ErrorDetailsBody>,
    #[serde(default)]
    pub order_tags: Option<OrderTags>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetailsBody {
    #[serde(default)]
    pub error_description: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════
// Subscriptions (mandates)
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct PlanDetails {
    pub plan_name: String,
    pub plan_type: &'static str,
    pub plan_max_amount: f64,
    pub plan_currency: String,
    pub plan_interval_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionMeta {
    pub return_url: String,
    pub notify_url: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionTags {
    pub mandate_ref: String,
    pub mandate_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionBody {
    pub subscription_id: String,
    pub customer_details: CustomerDetails,
    pub plan_details: PlanDetails,
    pub subscription_meta: SubscriptionMeta,
    pub subscription_tags: SubscriptionTags,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionResponse {
    pub subscription_id: String,
    #[serde(default)]
    pub authorization_link: Option<String>,
    #[serde(default)]
    pub authorization_details: Option<AuthorizationDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizationDetails {
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChargeBody {
    pub subscription_id: String,
    pub payment_id: String,
    pub payment_amount: f64,
    pub payment_currency: String,
    pub payment_type: &'static str,
    pub payment_method: String,
}

#[derive(Debug, Deserialize)]
pub struct ChargeResponse {
    #[serde(default)]
    pub cf_payment_id: Option<serde_json::Value>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub failure_details: Option<FailureDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailureDetails {
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ChargeResponse {
    /// Gateway payment id, falling back to our own charge id.
    pub fn transaction_id(&self, charge_id: &str) -> String {
        match &self.cf_payment_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Null) | None => charge_id.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Gateway error body.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
