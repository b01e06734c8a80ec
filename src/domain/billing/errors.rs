//! Billing-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | MandateNotFound / PurchaseNotFound / PlanNotFound | 404 |
//! | InvalidTransition | 409 |
//! | Validation | 400 |
//! | Gateway | 502 |
//! | Infrastructure | 500 |
//!
//! The webhook and callback endpoints never surface these; they log
//! and answer with an acknowledgment or a redirect.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    #[error("Mandate not found: {0}")]
    MandateNotFound(String),

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Gateway error: {message}")]
    Gateway { message: String, retryable: bool },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn mandate_not_found(reference: impl Into<String>) -> Self {
        BillingError::MandateNotFound(reference.into())
    }

    pub fn purchase_not_found(id: impl Into<String>) -> Self {
        BillingError::PurchaseNotFound(id.into())
    }

    pub fn plan_not_found(id: impl Into<String>) -> Self {
        BillingError::PlanNotFound(id.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        BillingError::Infrastructure(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::MandateNotFound(_) => ErrorCode::MandateNotFound,
            BillingError::PurchaseNotFound(_) => ErrorCode::PurchaseNotFound,
            BillingError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            BillingError::InvalidTransition(_) => ErrorCode::InvalidStateTransition,
            BillingError::Validation(_) => ErrorCode::ValidationFailed,
            BillingError::Gateway { .. } => ErrorCode::GatewayError,
            BillingError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Timeouts and transient gateway or storage failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Gateway { retryable, .. } => *retryable,
            BillingError::Infrastructure(_) => true,
            _ => false,
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::MandateNotFound => BillingError::MandateNotFound(err.message),
            ErrorCode::PurchaseNotFound => BillingError::PurchaseNotFound(err.message),
            ErrorCode::PlanNotFound => BillingError::PlanNotFound(err.message),
            ErrorCode::InvalidStateTransition => BillingError::InvalidTransition(err.message),
            ErrorCode::ValidationFailed => BillingError::Validation(
                ValidationError::invalid_format("input", err.message),
            ),
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}

impl From<BillingError> for DomainError {
    fn from(err: BillingError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
