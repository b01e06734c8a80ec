//! Read-only price catalog port.
//!
//! Prices are owned by catalog management; billing only reads them.

use crate::domain::billing::{PlanPrice, ProgramPrice};
use crate::domain::foundation::{DomainError, PlanId, ProductId};
use async_trait::async_trait;

#[async_trait]
pub trait PriceCatalog: Send + Sync {
    async fn plan_price(&self, plan_id: &PlanId) -> Result<Option<PlanPrice>, DomainError>;

    async fn program_price(&self, product_id: &ProductId)
        -> Result<Option<ProgramPrice>, DomainError>;
}
