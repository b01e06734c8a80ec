//! PostgreSQL implementation of PurchaseRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, db_error};
use crate::domain::billing::{OneTimeProgramPurchase, PurchaseStatus};
use crate::domain::foundation::{
    DomainError, ErrorCode, OrderId, ProductId, PurchaseId, Timestamp, UserId,
};
use crate::ports::{PurchaseRepository, StatusWrite};

const PURCHASE_COLUMNS: &str = "id, user_id, product_id, order_id, amount, currency, status, \
     failure_reason, created_at, updated_at";

pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: String,
    product_id: String,
    order_id: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for OneTimeProgramPurchase {
    type Error = DomainError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let order_id = row
            .order_id
            .map(OrderId::new)
            .transpose()
            .map_err(|e| corrupt("order_id", e))?;

        Ok(OneTimeProgramPurchase {
            id: PurchaseId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            product_id: ProductId::new(row.product_id).map_err(|e| corrupt("product_id", e))?,
            order_id,
            amount: row.amount,
            currency: row.currency,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            failure_reason: row.failure_reason,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn insert(&self, purchase: &OneTimeProgramPurchase) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO one_time_program_purchases (
                id, user_id, product_id, order_id, amount, currency, status,
                failure_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.user_id.as_str())
        .bind(purchase.product_id.as_str())
        .bind(purchase.order_id.as_ref().map(|o| o.as_str()))
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(purchase.status.as_str())
        .bind(&purchase.failure_reason)
        .bind(purchase.created_at.as_datetime())
        .bind(purchase.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("insert purchase", e))?;

        Ok(())
    }

    async fn attach_order(&self, id: &PurchaseId, order_id: &OrderId) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE one_time_program_purchases SET order_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(order_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("attach order", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::PurchaseNotFound,
                format!("purchase {} not found", id),
            ));
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PurchaseId,
    ) -> Result<Option<OneTimeProgramPurchase>, DomainError> {
        let row: Option<PurchaseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM one_time_program_purchases WHERE id = $1",
            PURCHASE_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find purchase", e))?;

        row.map(OneTimeProgramPurchase::try_from).transpose()
    }

    async fn settle_pending(
        &self,
        id: &PurchaseId,
        target: PurchaseStatus,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) -> Result<StatusWrite<OneTimeProgramPurchase>, DomainError> {
        let updated: Option<PurchaseRow> = sqlx::query_as(&format!(
            r#"
            UPDATE one_time_program_purchases
            SET status = $2, failure_reason = $3, updated_at = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(target.as_str())
        .bind(failure_reason)
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("settle purchase", e))?;

        if let Some(row) = updated {
            return Ok(StatusWrite::Updated(OneTimeProgramPurchase::try_from(row)?));
        }

        Ok(match self.find_by_id(id).await? {
            Some(current) => StatusWrite::Unchanged(current),
            None => StatusWrite::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(order_id: Option<&str>) -> PurchaseRow {
        PurchaseRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            product_id: "program-42".to_string(),
            order_id: order_id.map(str::to_string),
            amount: 99_900,
            currency: "INR".to_string(),
            status: "paid".to_string(),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_converts_with_order() {
        let purchase = OneTimeProgramPurchase::try_from(row(Some("order_1"))).unwrap();

        assert_eq!(purchase.status, PurchaseStatus::Paid);
        assert_eq!(purchase.order_id.unwrap().as_str(), "order_1");
    }

    #[test]
    fn row_without_order_is_still_valid() {
        let purchase = OneTimeProgramPurchase::try_from(row(None)).unwrap();
        assert!(purchase.order_id.is_none());
    }
}
