//! PostgreSQL adapters - Database implementations for the billing storage ports.
//!
//! - `PostgresMandateRepository` - mandates and their conditional status writes
//! - `PostgresSubscriptionStore` - subscriptions, invoices and the user paid flag
//! - `PostgresPurchaseRepository` - one-time program purchases
//! - `PostgresPriceCatalog` - plan and program prices (read-only)
//! - `PostgresGatewayConfigStore` - the sandbox/production toggle row
//!
//! Every state change is a single conditional statement or one
//! transaction; none of these adapters read-then-write without a lock.

mod gateway_config_store;
mod mandate_repository;
mod price_catalog;
mod purchase_repository;
mod subscription_store;

pub use gateway_config_store::PostgresGatewayConfigStore;
pub use mandate_repository::PostgresMandateRepository;
pub use price_catalog::PostgresPriceCatalog;
pub use purchase_repository::PostgresPurchaseRepository;
pub use subscription_store::PostgresSubscriptionStore;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Wraps a sqlx failure with what was being attempted.
pub(crate) fn db_error(action: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, err))
}

/// A stored value that no longer parses into its domain type.
pub(crate) fn corrupt(column: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value in database: {}", column, err),
    )
}
