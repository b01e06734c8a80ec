//! Append-only record of one recurring charge attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{PlanPrice, Subscription};
use crate::domain::foundation::{
    InvoiceId, PlanId, SubscriptionId, Timestamp, UserId, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Paid,
    Failed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(InvoiceStatus::Paid),
            "failed" => Ok(InvoiceStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "invoice_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// One charge attempt. Never updated after insert; the external
/// transaction id is unique so replays are dropped by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInvoice {
    pub id: InvoiceId,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub base_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub currency: String,
    pub external_transaction_id: String,
    pub status: InvoiceStatus,
    pub failure_reason: Option<String>,
    pub billing_date: Timestamp,
}

impl SubscriptionInvoice {
    fn build(
        subscription: &Subscription,
        price: &PlanPrice,
        external_transaction_id: impl Into<String>,
        status: InvoiceStatus,
        failure_reason: Option<String>,
        billing_date: Timestamp,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            plan_id: subscription.plan_id.clone(),
            base_amount: price.base_amount,
            tax_amount: price.tax_amount,
            total_amount: price.total(),
            currency: price.currency.clone(),
            external_transaction_id: external_transaction_id.into(),
            status,
            failure_reason,
            billing_date,
        }
    }

    pub fn paid(
        subscription: &Subscription,
        price: &PlanPrice,
        external_transaction_id: impl Into<String>,
        billing_date: Timestamp,
    ) -> Self {
        Self::build(
            subscription,
            price,
            external_transaction_id,
            InvoiceStatus::Paid,
            None,
            billing_date,
        )
    }

    pub fn failed(
        subscription: &Subscription,
        price: &PlanPrice,
        external_transaction_id: impl Into<String>,
        reason: impl Into<String>,
        billing_date: Timestamp,
    ) -> Self {
        Self::build(
            subscription,
            price,
            external_transaction_id,
            InvoiceStatus::Failed,
            Some(reason.into()),
            billing_date,
        )
    }
}
