//! One-time program purchases.
//!
//! Same tie-break as mandates: `Paid` is sticky and `Failed` only
//! applies to a purchase that is still `Pending`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::mandate::validate_currency;
use crate::domain::foundation::{
    OrderId, ProductId, PurchaseId, StateMachine, Timestamp, UserId, ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "paid" => Ok(PurchaseStatus::Paid),
            "failed" => Ok(PurchaseStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "purchase_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for PurchaseStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PurchaseStatus::*;
        matches!((self, target), (Pending, Paid) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PurchaseStatus::*;
        match self {
            Pending => vec![Paid, Failed],
            Paid | Failed => vec![],
        }
    }
}

/// A non-recurring purchase of a single program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeProgramPurchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Gateway order; set once the checkout order is created.
    pub order_id: Option<OrderId>,
    pub amount: i64,
    pub currency: String,
    pub status: PurchaseStatus,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OneTimeProgramPurchase {
    pub fn pending(
        user_id: UserId,
        product_id: ProductId,
        amount: i64,
        currency: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::not_positive("amount", amount));
        }
        let currency = currency.into();
        validate_currency(&currency)?;

        Ok(Self {
            id: PurchaseId::new(),
            user_id,
            product_id,
            order_id: None,
            amount,
            currency: currency.to_ascii_uppercase(),
            status: PurchaseStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        })
    }
}
