//! One-time purchase repository port.

use crate::domain::billing::{OneTimeProgramPurchase, PurchaseStatus};
use crate::domain::foundation::{DomainError, OrderId, PurchaseId, Timestamp};
use async_trait::async_trait;

use super::StatusWrite;

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn insert(&self, purchase: &OneTimeProgramPurchase) -> Result<(), DomainError>;

    /// Records the gateway order created for a pending purchase.
    async fn attach_order(&self, id: &PurchaseId, order_id: &OrderId) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PurchaseId)
        -> Result<Option<OneTimeProgramPurchase>, DomainError>;

    /// Settles a `Pending` purchase to `target` in one atomic statement.
    ///
    /// `Paid` and `Failed` rows come back as `Unchanged`.
    async fn settle_pending(
        &self,
        id: &PurchaseId,
        target: PurchaseStatus,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<StatusWrite<OneTimeProgramPurchase>, DomainError>;
}
