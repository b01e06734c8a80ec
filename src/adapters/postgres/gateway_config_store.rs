//! PostgreSQL implementation of GatewayConfigStore.
//!
//! `gateway_config` holds a single row keyed by `id = 1`. Every call
//! reads it fresh.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{corrupt, db_error};
use crate::domain::billing::GatewayMode;
use crate::domain::foundation::DomainError;
use crate::ports::GatewayConfigStore;

pub struct PostgresGatewayConfigStore {
    pool: PgPool,
}

impl PostgresGatewayConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GatewayConfigStore for PostgresGatewayConfigStore {
    async fn current_mode(&self) -> Result<Option<GatewayMode>, DomainError> {
        let mode: Option<String> = sqlx::query_scalar("SELECT mode FROM gateway_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read gateway mode", e))?;

        mode.map(|m| m.parse::<GatewayMode>().map_err(|e| corrupt("mode", e)))
            .transpose()
    }
}
