//! Gateway webhook payloads and order-status classification.
//!
//! Only the fields the billing core acts on are modelled; everything
//! else in the gateway payload is ignored.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ExternalRef, OrderId, PurchaseId};

const SUCCEEDED_EVENTS: &[&str] = &[
    "PAYMENT_SUCCESS_WEBHOOK",
    "SUBSCRIPTION_PAYMENT_SUCCESS_WEBHOOK",
    "SUBSCRIPTION_AUTH_SUCCESS_WEBHOOK",
];

const FAILED_EVENTS: &[&str] = &[
    "PAYMENT_FAILED_WEBHOOK",
    "PAYMENT_USER_DROPPED_WEBHOOK",
    "SUBSCRIPTION_PAYMENT_FAILED_WEBHOOK",
    "SUBSCRIPTION_AUTH_FAILED_WEBHOOK",
];

const PAID_ORDER_STATUSES: &[&str] = &["PAID", "COMPLETED"];

/// Classified webhook event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    PaymentSucceeded,
    PaymentFailed,
    Other,
}

impl WebhookEventKind {
    pub fn classify(event_type: &str) -> Self {
        if SUCCEEDED_EVENTS.contains(&event_type) {
            WebhookEventKind::PaymentSucceeded
        } else if FAILED_EVENTS.contains(&event_type) {
            WebhookEventKind::PaymentFailed
        } else {
            WebhookEventKind::Other
        }
    }
}

/// Local record a gateway event or callback refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Mandate(ExternalRef),
    Purchase(PurchaseId),
}

impl Correlation {
    /// Builds a correlation from callback query values. A mandate
    /// reference wins when both are present.
    pub fn from_parts(mandate_ref: Option<&str>, purchase_id: Option<&str>) -> Option<Self> {
        if let Some(reference) = mandate_ref.and_then(|r| ExternalRef::new(r).ok()) {
            return Some(Correlation::Mandate(reference));
        }
        purchase_id
            .and_then(|id| id.trim().parse::<PurchaseId>().ok())
            .map(Correlation::Purchase)
    }
}

/// Tags we attach to gateway orders; the gateway echoes them back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTags {
    #[serde(default)]
    pub mandate_ref: Option<String>,
    #[serde(default)]
    pub purchase_id: Option<String>,
}

impl OrderTags {
    pub fn for_mandate(reference: &ExternalRef) -> Self {
        Self {
            mandate_ref: Some(reference.to_string()),
            purchase_id: None,
        }
    }

    pub fn for_purchase(id: &PurchaseId) -> Self {
        Self {
            mandate_ref: None,
            purchase_id: Some(id.to_string()),
        }
    }

    pub fn correlation(&self) -> Option<Correlation> {
        let mandate_ref = self
            .mandate_ref
            .as_deref()
            .filter(|r| !r.trim().is_empty());
        Correlation::from_parts(mandate_ref, self.purchase_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookOrder {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_tags: Option<OrderTags>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayment {
    #[serde(default)]
    pub cf_payment_id: Option<serde_json::Value>,
    #[serde(default)]
    pub payment_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub order: Option<WebhookOrder>,
    #[serde(default)]
    pub payment: Option<WebhookPayment>,
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
}

/// Parsed gateway webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayWebhook {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub data: WebhookData,
}

impl GatewayWebhook {
    pub fn parse(raw_body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw_body)
    }

    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::classify(&self.event_type)
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.data
            .order
            .as_ref()
            .and_then(|o| o.order_id.as_deref())
            .and_then(|id| OrderId::new(id).ok())
    }

    /// Mandate tag, then subscription id, then purchase tag.
    pub fn correlation(&self) -> Option<Correlation> {
        let tags = self.data.order.as_ref().and_then(|o| o.order_tags.as_ref());
        let mandate_ref = tags
            .and_then(|t| t.mandate_ref.as_deref())
            .filter(|r| !r.trim().is_empty())
            .or_else(|| {
                self.data
                    .subscription_details
                    .as_ref()
                    .and_then(|s| s.subscription_id.as_deref())
            });
        let purchase_id = tags.and_then(|t| t.purchase_id.as_deref());
        Correlation::from_parts(mandate_ref, purchase_id)
    }

    /// Gateway payment id, used as the transaction reference.
    pub fn payment_id(&self) -> Option<String> {
        self.data
            .payment
            .as_ref()
            .and_then(|p| p.cf_payment_id.as_ref())
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    pub fn failure_reason(&self) -> Option<String> {
        first_reason([
            self.data.payment.as_ref().and_then(|p| p.payment_message.as_deref()),
            self.data
                .error_details
                .as_ref()
                .and_then(|e| e.error_description.as_deref()),
            self.data.error_details.as_ref().and_then(|e| e.error_reason.as_deref()),
        ])
    }
}

/// Local outcome of a verified gateway order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Paid,
    Failed { reason: String },
}

impl OrderOutcome {
    /// Maps a gateway order status. `PAID` and `COMPLETED` are success;
    /// anything else is a failure whose reason is the first usable hint,
    /// falling back to the status itself.
    pub fn from_status<'a>(
        status: &str,
        reason_hints: impl IntoIterator<Item = Option<&'a str>>,
    ) -> Self {
        let normalized = status.trim().to_ascii_uppercase();
        if PAID_ORDER_STATUSES.contains(&normalized.as_str()) {
            return OrderOutcome::Paid;
        }
        let reason = first_reason(reason_hints).unwrap_or_else(|| {
            if normalized.is_empty() {
                "unknown".to_string()
            } else {
                normalized.to_ascii_lowercase()
            }
        });
        OrderOutcome::Failed { reason }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, OrderOutcome::Paid)
    }
}

fn first_reason<'a>(hints: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    hints
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
