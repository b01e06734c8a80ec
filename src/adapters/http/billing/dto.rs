//! HTTP DTOs for billing endpoints.
//!
//! Amounts cross this boundary in major currency units; the application
//! layer works in minor units.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::{
    ChargeStatus, CreatePurchaseResult, InitiateMandateResult, MandateRunResult,
    RecurringRunReport,
};
use crate::domain::billing::BillingFrequency;
use crate::domain::foundation::{
    ExternalRef, InvoiceId, MandateId, OrderId, PurchaseId, Timestamp, ValidationError,
};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to set up a recurring mandate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateMandateRequest {
    pub plan_id: String,
    pub frequency: BillingFrequency,
    /// Charge cap in major units; defaults to the plan total.
    #[serde(default)]
    pub max_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub product_id: String,
}

/// Query string of the browser return. Every field is optional; missing
/// ones are handled by the reconciler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
    #[serde(default, alias = "mandateRef")]
    pub mandate_ref: Option<String>,
    #[serde(default, alias = "purchaseId")]
    pub purchase_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of every webhook acknowledgment.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MandateResponse {
    pub mandate_id: MandateId,
    pub external_ref: ExternalRef,
    pub authorization_url: Option<String>,
}

impl From<InitiateMandateResult> for MandateResponse {
    fn from(result: InitiateMandateResult) -> Self {
        Self {
            mandate_id: result.mandate_id,
            external_ref: result.external_ref,
            authorization_url: result.authorization_url,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub purchase_id: PurchaseId,
    pub order_id: OrderId,
    pub payment_session_id: Option<String>,
}

impl From<CreatePurchaseResult> for PurchaseResponse {
    fn from(result: CreatePurchaseResult) -> Self {
        Self {
            purchase_id: result.purchase_id,
            order_id: result.order_id,
            payment_session_id: result.payment_session_id,
        }
    }
}

/// One line of the recurring run summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResultResponse {
    pub mandate_id: MandateId,
    pub charge: ChargeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<InvoiceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<MandateRunResult> for RunResultResponse {
    fn from(result: MandateRunResult) -> Self {
        Self {
            mandate_id: result.mandate_id,
            charge: result.charge,
            invoice_id: result.invoice_id,
            transaction_id: result.transaction_id,
            end_date: result.end_date,
            reason: result.reason,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringRunResponse {
    pub results: Vec<RunResultResponse>,
}

impl From<RecurringRunReport> for RecurringRunResponse {
    fn from(report: RecurringRunReport) -> Self {
        Self {
            results: report.results.into_iter().map(Into::into).collect(),
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

/// Converts a major-unit amount to minor units (paise, cents).
pub fn to_minor_units(field: &str, amount: f64) -> Result<i64, ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::invalid_format(
            field,
            "must be a positive amount",
        ));
    }
    Ok((amount * 100.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_round_to_nearest() {
        assert_eq!(to_minor_units("max_amount", 499.0).unwrap(), 49_900);
        assert_eq!(to_minor_units("max_amount", 588.82).unwrap(), 58_882);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(to_minor_units("max_amount", 0.0).is_err());
        assert!(to_minor_units("max_amount", -1.0).is_err());
        assert!(to_minor_units("max_amount", f64::NAN).is_err());
    }

    #[test]
    fn mandate_request_reads_camel_case() {
        let request: InitiateMandateRequest =
            serde_json::from_str(r#"{"planId":"pro","frequency":"YEARLY","maxAmount":1200}"#)
                .unwrap();

        assert_eq!(request.plan_id, "pro");
        assert_eq!(request.frequency, BillingFrequency::Yearly);
        assert_eq!(request.max_amount, Some(1200.0));
    }

    #[test]
    fn run_result_omits_empty_fields() {
        let line = RunResultResponse {
            mandate_id: MandateId::new(),
            charge: ChargeStatus::Skipped,
            invoice_id: None,
            transaction_id: None,
            end_date: None,
            reason: Some("not_due".to_string()),
        };

        let json = serde_json::to_value(&line).unwrap();

        assert_eq!(json["charge"], "skipped");
        assert_eq!(json["reason"], "not_due");
        assert!(json.get("invoiceId").is_none());
        assert!(json.get("mandateId").is_some());
    }
}
