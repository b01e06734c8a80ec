//! PostgreSQL implementation of PriceCatalog.
//!
//! Reads the `plans` and `programs` tables maintained by catalog tooling.

use async_trait::async_trait;
use sqlx::PgPool;

use super::db_error;
use crate::domain::billing::{PlanPrice, ProgramPrice};
use crate::domain::foundation::{DomainError, PlanId, ProductId};
use crate::ports::PriceCatalog;

pub struct PostgresPriceCatalog {
    pool: PgPool,
}

impl PostgresPriceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    base_amount: i64,
    tax_amount: i64,
    currency: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ProgramRow {
    amount: i64,
    currency: String,
}

#[async_trait]
impl PriceCatalog for PostgresPriceCatalog {
    async fn plan_price(&self, plan_id: &PlanId) -> Result<Option<PlanPrice>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT base_amount, tax_amount, currency FROM plans WHERE id = $1 AND is_active",
        )
        .bind(plan_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read plan price", e))?;

        Ok(row.map(|r| PlanPrice {
            plan_id: plan_id.clone(),
            base_amount: r.base_amount,
            tax_amount: r.tax_amount,
            currency: r.currency,
        }))
    }

    async fn program_price(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProgramPrice>, DomainError> {
        let row: Option<ProgramRow> = sqlx::query_as(
            "SELECT amount, currency FROM programs WHERE id = $1 AND is_active",
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("read program price", e))?;

        Ok(row.map(|r| ProgramPrice {
            product_id: product_id.clone(),
            amount: r.amount,
            currency: r.currency,
        }))
    }
}
