//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps, the state machine trait and the error
//! vocabulary used across the billing domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    ExternalRef, InvoiceId, MandateId, OrderId, PlanId, ProductId, PurchaseId, SubscriptionId,
    UserId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
