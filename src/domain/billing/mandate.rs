//! Mandate entity and its status state machine.
//!
//! A mandate is a user's standing authorization to be charged on a
//! schedule. It starts `Pending` and is finalized exactly once, to
//! `Active` or `Failed`, by whichever reconciliation path sees the
//! gateway's terminal state first. Both terminal states are final:
//! re-authorization always creates a new mandate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::BillingFrequency;
use crate::domain::foundation::{
    ExternalRef, MandateId, PlanId, StateMachine, Timestamp, UserId, ValidationError,
};

/// Mandate authorization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MandateStatus {
    /// Created locally, waiting for the gateway to report an outcome.
    Pending,
    /// Authorized; eligible for recurring charges.
    Active,
    /// Authorization failed or was abandoned.
    Failed,
}

impl MandateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MandateStatus::Pending => "pending",
            MandateStatus::Active => "active",
            MandateStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MandateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MandateStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MandateStatus::Pending),
            "active" => Ok(MandateStatus::Active),
            "failed" => Ok(MandateStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "mandate_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

impl StateMachine for MandateStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use MandateStatus::*;
        matches!((self, target), (Pending, Active) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use MandateStatus::*;
        match self {
            Pending => vec![Active, Failed],
            Active | Failed => vec![],
        }
    }
}

/// A standing authorization to charge a user on a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mandate {
    pub id: MandateId,
    pub external_ref: ExternalRef,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub status: MandateStatus,
    pub frequency: BillingFrequency,
    /// Gateway descriptor of the instrument (e.g. "upi", "card").
    pub payment_method: String,
    /// Upper bound for a single charge, minor currency units.
    pub max_amount: i64,
    pub currency: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Inputs for a freshly initiated mandate.
#[derive(Debug, Clone)]
pub struct NewMandate {
    pub external_ref: ExternalRef,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub frequency: BillingFrequency,
    pub payment_method: String,
    pub max_amount: i64,
    pub currency: String,
}

impl Mandate {
    /// Builds a `Pending` mandate, validating amounts and currency.
    pub fn pending(new: NewMandate, now: Timestamp) -> Result<Self, ValidationError> {
        if new.max_amount <= 0 {
            return Err(ValidationError::not_positive("max_amount", new.max_amount));
        }
        validate_currency(&new.currency)?;
        if new.payment_method.trim().is_empty() {
            return Err(ValidationError::empty_field("payment_method"));
        }

        Ok(Self {
            id: MandateId::new(),
            external_ref: new.external_ref,
            user_id: new.user_id,
            plan_id: new.plan_id,
            status: MandateStatus::Pending,
            frequency: new.frequency,
            payment_method: new.payment_method,
            max_amount: new.max_amount,
            currency: new.currency.to_ascii_uppercase(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == MandateStatus::Active
    }

    /// True when a charge of `amount` is within the authorized cap.
    pub fn covers(&self, amount: i64) -> bool {
        amount <= self.max_amount
    }
}

pub(crate) fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::invalid_format(
            "currency",
            "expected a three-letter ISO 4217 code",
        ));
    }
    Ok(())
}
