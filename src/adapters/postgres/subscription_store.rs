//! PostgreSQL implementation of SubscriptionStore.
//!
//! Activation and renewal are single transactions that lock the
//! subscription row, so two concurrent activations of one mandate
//! serialize and the second observes the first one's period.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{corrupt, db_error};
use crate::domain::billing::{Mandate, Subscription, SubscriptionInvoice};
use crate::domain::foundation::{
    DomainError, ErrorCode, InvoiceId, MandateId, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{ActivationWrite, RenewalWrite, SubscriptionStore};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, mandate_id, plan_id, status, start_date, \
     end_date, renewed_at, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, subscription_id, user_id, plan_id, base_amount, tax_amount, \
     total_amount, currency, external_transaction_id, status, failure_reason, billing_date";

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    mandate_id: Uuid,
    plan_id: String,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    renewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            mandate_id: MandateId::from_uuid(row.mandate_id),
            plan_id: PlanId::new(row.plan_id).map_err(|e| corrupt("plan_id", e))?,
            status: row.status.parse().map_err(|e| corrupt("status", e))?,
            start_date: Timestamp::from_datetime(row.start_date),
            end_date: Timestamp::from_datetime(row.end_date),
            renewed_at: row.renewed_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    subscription_id: Uuid,
    user_id: String,
    plan_id: String,
    base_amount: i64,
    tax_amount: i64,
    total_amount: i64,
    currency: String,
    external_transaction_id: String,
    status: String,
    failure_reason: Option<String>,
    billing_date: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for SubscriptionInvoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionInvoice {
            id: InvoiceId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            plan_id: PlanId::new(row.plan_id).map_err(|e| corrupt("plan_id", e))?,
            base_amount: row.base_amount,
            tax_amount: row.tax_amount,
            total_amount: row.total_amount,
            currency: row.currency,
            external_transaction_id: row.external_transaction_id,
            status: row.status.parse().map_err(|e| corrupt("invoice status", e))?,
            failure_reason: row.failure_reason,
            billing_date: Timestamp::from_datetime(row.billing_date),
        })
    }
}

async fn lock_by_mandate(
    tx: &mut Transaction<'static, Postgres>,
    mandate_id: &MandateId,
) -> Result<Option<Subscription>, DomainError> {
    let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM subscriptions WHERE mandate_id = $1 FOR UPDATE",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(mandate_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| db_error("lock subscription", e))?;

    row.map(Subscription::try_from).transpose()
}

async fn write_period(
    tx: &mut Transaction<'static, Postgres>,
    subscription: &Subscription,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        UPDATE subscriptions SET
            status = $2,
            start_date = $3,
            end_date = $4,
            renewed_at = $5,
            updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.status.as_str())
    .bind(subscription.start_date.as_datetime())
    .bind(subscription.end_date.as_datetime())
    .bind(subscription.renewed_at.map(Timestamp::into_datetime))
    .bind(subscription.updated_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("update subscription", e))?;

    Ok(())
}

async fn clear_claim<'e, E>(executor: E, id: &SubscriptionId) -> Result<(), DomainError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("UPDATE subscriptions SET renewal_claimed_at = NULL WHERE id = $1")
        .bind(id.as_uuid())
        .execute(executor)
        .await
        .map_err(|e| db_error("clear renewal claim", e))?;
    Ok(())
}

/// Flips the membership flag only when it is currently false.
async fn mark_user_paid(
    tx: &mut Transaction<'static, Postgres>,
    user_id: &UserId,
) -> Result<bool, DomainError> {
    let result = sqlx::query("UPDATE users SET is_paid = TRUE WHERE id = $1 AND is_paid = FALSE")
        .bind(user_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("update user paid flag", e))?;

    Ok(result.rows_affected() > 0)
}

/// First write wins on the external transaction id.
async fn append_invoice<'e, E>(executor: E, invoice: &SubscriptionInvoice) -> Result<bool, DomainError>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO subscription_invoices (
            id, subscription_id, user_id, plan_id, base_amount, tax_amount,
            total_amount, currency, external_transaction_id, status, failure_reason, billing_date
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (external_transaction_id) DO NOTHING
        "#,
    )
    .bind(invoice.id.as_uuid())
    .bind(invoice.subscription_id.as_uuid())
    .bind(invoice.user_id.as_str())
    .bind(invoice.plan_id.as_str())
    .bind(invoice.base_amount)
    .bind(invoice.tax_amount)
    .bind(invoice.total_amount)
    .bind(&invoice.currency)
    .bind(&invoice.external_transaction_id)
    .bind(invoice.status.as_str())
    .bind(&invoice.failure_reason)
    .bind(invoice.billing_date.as_datetime())
    .execute(executor)
    .await
    .map_err(|e| db_error("insert invoice", e))?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn find_by_mandate(
        &self,
        mandate_id: &MandateId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE mandate_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(mandate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = $1 ORDER BY end_date DESC LIMIT 1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn activate(
        &self,
        mandate: &Mandate,
        now: Timestamp,
    ) -> Result<ActivationWrite, DomainError> {
        let mut tx = self.begin().await?;

        let write = match lock_by_mandate(&mut tx, &mandate.id).await? {
            Some(existing) if existing.is_current(now) => ActivationWrite::Unchanged(existing),
            Some(mut existing) => {
                existing.restart(mandate.frequency, now);
                write_period(&mut tx, &existing).await?;
                ActivationWrite::Refreshed(existing)
            }
            None => {
                let created = Subscription::for_activation(mandate, now);
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO subscriptions (
                        id, user_id, mandate_id, plan_id, status, start_date,
                        end_date, renewed_at, created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    ON CONFLICT (mandate_id) DO NOTHING
                    "#,
                )
                .bind(created.id.as_uuid())
                .bind(created.user_id.as_str())
                .bind(created.mandate_id.as_uuid())
                .bind(created.plan_id.as_str())
                .bind(created.status.as_str())
                .bind(created.start_date.as_datetime())
                .bind(created.end_date.as_datetime())
                .bind(created.renewed_at.map(Timestamp::into_datetime))
                .bind(created.created_at.as_datetime())
                .bind(created.updated_at.as_datetime())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert subscription", e))?;

                if inserted.rows_affected() > 0 {
                    ActivationWrite::Created(created)
                } else {
                    // A concurrent activation inserted first and has committed.
                    let current = lock_by_mandate(&mut tx, &mandate.id).await?.ok_or_else(|| {
                        DomainError::new(
                            ErrorCode::SubscriptionNotFound,
                            format!("subscription for mandate {} vanished", mandate.id),
                        )
                    })?;
                    ActivationWrite::Unchanged(current)
                }
            }
        };

        let flipped = mark_user_paid(&mut tx, &mandate.user_id).await?;
        tx.commit().await.map_err(|e| db_error("commit activation", e))?;

        if flipped {
            tracing::debug!(user_id = %mandate.user_id, "User marked paid");
        }
        Ok(write)
    }

    async fn claim_renewal(
        &self,
        id: &SubscriptionId,
        period_end: Timestamp,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET renewal_claimed_at = $3
            WHERE id = $1
              AND end_date = $2
              AND (renewal_claimed_at IS NULL OR renewal_claimed_at <= $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(period_end.as_datetime())
        .bind(now.as_datetime())
        .bind(stale_before.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("claim renewal", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_renewal(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        clear_claim(&self.pool, id).await
    }

    async fn record_renewal(
        &self,
        renewed: &Subscription,
        previous_end: Timestamp,
        invoice: &SubscriptionInvoice,
    ) -> Result<RenewalWrite, DomainError> {
        let mut tx = self.begin().await?;

        let current = lock_by_mandate(&mut tx, &renewed.mandate_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", renewed.id),
                )
            })?;

        append_invoice(&mut *tx, invoice).await?;

        let write = if current.end_date != previous_end {
            RenewalWrite::Superseded(current)
        } else {
            write_period(&mut tx, renewed).await?;
            mark_user_paid(&mut tx, &renewed.user_id).await?;
            RenewalWrite::Renewed(renewed.clone())
        };
        clear_claim(&mut *tx, &renewed.id).await?;

        tx.commit().await.map_err(|e| db_error("commit renewal", e))?;
        Ok(write)
    }

    async fn record_failed_charge(
        &self,
        invoice: &SubscriptionInvoice,
    ) -> Result<bool, DomainError> {
        append_invoice(&self.pool, invoice).await
    }

    async fn list_invoices(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Vec<SubscriptionInvoice>, DomainError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscription_invoices WHERE subscription_id = $1 ORDER BY billing_date",
            INVOICE_COLUMNS
        ))
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list invoices", e))?;

        rows.into_iter().map(SubscriptionInvoice::try_from).collect()
    }

    async fn is_user_paid(&self, user_id: &UserId) -> Result<bool, DomainError> {
        let paid: Option<bool> = sqlx::query_scalar("SELECT is_paid FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read user paid flag", e))?;

        Ok(paid.unwrap_or(false))
    }
}
