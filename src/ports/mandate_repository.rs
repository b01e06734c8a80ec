//! Mandate repository port.
//!
//! Status changes go through [`MandateRepository::transition_pending`],
//! a single conditional write that only touches rows still `Pending`.
//! Webhook and callback paths race on the same row; the conditional
//! write is what makes the second arrival a no-op instead of an
//! overwrite.

use crate::domain::billing::{Mandate, MandateStatus};
use crate::domain::foundation::{DomainError, ExternalRef, MandateId, Timestamp};
use async_trait::async_trait;

/// Result of a conditional status write keyed by an external reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite<T> {
    /// The row was still pending and now carries the target status.
    Updated(T),
    /// The row had already left the pending state; nothing was written.
    Unchanged(T),
    /// No row matches the reference.
    NotFound,
}

/// Repository port for mandates.
#[async_trait]
pub trait MandateRepository: Send + Sync {
    /// Insert a freshly initiated mandate.
    ///
    /// # Errors
    ///
    /// - `DuplicateReference` if the external reference already exists
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, mandate: &Mandate) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &MandateId) -> Result<Option<Mandate>, DomainError>;

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Mandate>, DomainError>;

    /// All mandates currently `Active`, oldest first.
    async fn list_active(&self) -> Result<Vec<Mandate>, DomainError>;

    /// Moves a `Pending` mandate to `target` in one atomic statement.
    ///
    /// Rows in any other state are returned untouched as `Unchanged`.
    async fn transition_pending(
        &self,
        reference: &ExternalRef,
        target: MandateStatus,
        now: Timestamp,
    ) -> Result<StatusWrite<Mandate>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandate_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn MandateRepository) {}
    }
}
