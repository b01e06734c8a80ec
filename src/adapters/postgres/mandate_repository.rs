//! PostgreSQL implementation of MandateRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, db_error};
use crate::domain::billing::{Mandate, MandateStatus};
use crate::domain::foundation::{
    DomainError, ErrorCode, ExternalRef, MandateId, PlanId, Timestamp, UserId,
};
use crate::ports::{MandateRepository, StatusWrite};

const MANDATE_COLUMNS: &str = "id, external_ref, user_id, plan_id, status, frequency, \
     payment_method, max_amount, currency, created_at, updated_at";

/// Unique index on `mandates.external_ref`.
const EXTERNAL_REF_CONSTRAINT: &str = "mandates_external_ref_key";

pub struct PostgresMandateRepository {
    pool: PgPool,
}

impl PostgresMandateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_ref(&self, reference: &ExternalRef) -> Result<Option<Mandate>, DomainError> {
        let row: Option<MandateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM mandates WHERE external_ref = $1",
            MANDATE_COLUMNS
        ))
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find mandate", e))?;

        row.map(Mandate::try_from).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MandateRow {
    id: Uuid,
    external_ref: String,
    user_id: String,
    plan_id: String,
    status: String,
    frequency: String,
    payment_method: String,
    max_amount: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MandateRow> for Mandate {
    type Error = DomainError;

    fn try_from(row: MandateRow) -> Result<Self, Self::Error> {
        Ok(Mandate {
            id: MandateId::from_uuid(row.id),
            external_ref: ExternalRef::new(row.external_ref).map_err(|e| corrupt("external_ref", e))?,
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            plan_id: PlanId::new(row.plan_id).map_err(|e| corrupt("plan_id", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            frequency: row.frequency.parse().map_err(|e| corrupt("frequency", e))?,
            payment_method: row.payment_method,
            max_amount: row.max_amount,
            currency: row.currency,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl MandateRepository for PostgresMandateRepository {
    async fn insert(&self, mandate: &Mandate) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO mandates (
                id, external_ref, user_id, plan_id, status, frequency,
                payment_method, max_amount, currency, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(mandate.id.as_uuid())
        .bind(mandate.external_ref.as_str())
        .bind(mandate.user_id.as_str())
        .bind(mandate.plan_id.as_str())
        .bind(mandate.status.as_str())
        .bind(mandate.frequency.as_str())
        .bind(&mandate.payment_method)
        .bind(mandate.max_amount)
        .bind(&mandate.currency)
        .bind(mandate.created_at.as_datetime())
        .bind(mandate.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(EXTERNAL_REF_CONSTRAINT) {
                    return DomainError::new(
                        ErrorCode::DuplicateReference,
                        format!("mandate reference {} already exists", mandate.external_ref),
                    );
                }
            }
            db_error("insert mandate", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &MandateId) -> Result<Option<Mandate>, DomainError> {
        let row: Option<MandateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM mandates WHERE id = $1",
            MANDATE_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find mandate", e))?;

        row.map(Mandate::try_from).transpose()
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Mandate>, DomainError> {
        self.fetch_by_ref(reference).await
    }

    async fn list_active(&self) -> Result<Vec<Mandate>, DomainError> {
        let rows: Vec<MandateRow> = sqlx::query_as(&format!(
            "SELECT {} FROM mandates WHERE status = 'active' ORDER BY created_at",
            MANDATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list active mandates", e))?;

        rows.into_iter().map(Mandate::try_from).collect()
    }

    async fn transition_pending(
        &self,
        reference: &ExternalRef,
        target: MandateStatus,
        now: Timestamp,
    ) -> Result<StatusWrite<Mandate>, DomainError> {
        let updated: Option<MandateRow> = sqlx::query_as(&format!(
            r#"
            UPDATE mandates SET status = $2, updated_at = $3
            WHERE external_ref = $1 AND status = 'pending'
            RETURNING {}
            "#,
            MANDATE_COLUMNS
        ))
        .bind(reference.as_str())
        .bind(target.as_str())
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("transition mandate", e))?;

        if let Some(row) = updated {
            return Ok(StatusWrite::Updated(Mandate::try_from(row)?));
        }

        // Lost the race or already terminal; report what is stored.
        Ok(match self.fetch_by_ref(reference).await? {
            Some(current) => StatusWrite::Unchanged(current),
            None => StatusWrite::NotFound,
        })
    }
}
