//! InitiateMandateHandler - Creates a mandate authorization on the gateway.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::billing::{BillingError, BillingFrequency, Mandate, NewMandate};
use crate::domain::foundation::{
    ExternalRef, MandateId, PlanId, Timestamp, UserId, ValidationError,
};
use crate::ports::{CreateMandateRequest, MandateRepository, PaymentGateway, PriceCatalog};

use super::{CallbackUrls, GatewayConfigResolver};

/// Correlation key carried on the return URL.
const RETURN_KEY: &str = "mandate_ref";

/// Command to start a mandate setup.
#[derive(Debug, Clone)]
pub struct InitiateMandateCommand {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub frequency: BillingFrequency,
    /// Charge cap; defaults to the plan total.
    pub max_amount: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMandateResult {
    pub mandate_id: MandateId,
    pub external_ref: ExternalRef,
    /// Hosted page where the user approves the mandate.
    pub authorization_url: Option<String>,
}

/// Handler for mandate setup.
///
/// The mandate row is inserted PENDING only after the gateway accepted
/// the authorization, so every row has a reference the reconciliation
/// paths can find.
pub struct InitiateMandateHandler {
    mandates: Arc<dyn MandateRepository>,
    catalog: Arc<dyn PriceCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: Arc<GatewayConfigResolver>,
    urls: CallbackUrls,
}

impl InitiateMandateHandler {
    pub fn new(
        mandates: Arc<dyn MandateRepository>,
        catalog: Arc<dyn PriceCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        resolver: Arc<GatewayConfigResolver>,
        urls: CallbackUrls,
    ) -> Self {
        Self {
            mandates,
            catalog,
            gateway,
            resolver,
            urls,
        }
    }

    pub async fn handle(
        &self,
        cmd: InitiateMandateCommand,
    ) -> Result<InitiateMandateResult, BillingError> {
        let price = self
            .catalog
            .plan_price(&cmd.plan_id)
            .await?
            .ok_or_else(|| BillingError::plan_not_found(cmd.plan_id.as_str()))?;

        let max_amount = cmd.max_amount.unwrap_or_else(|| price.total());
        if max_amount < price.total() {
            return Err(BillingError::Validation(ValidationError::invalid_format(
                "max_amount",
                format!("must cover the plan total of {}", price.total()),
            )));
        }

        let mandate_id = MandateId::new();
        let requested_ref = ExternalRef::new(format!("mnd_{}", Uuid::new_v4().simple()))?;
        let return_url = self
            .urls
            .return_url_for(RETURN_KEY, requested_ref.as_str())?;

        let ctx = self.resolver.resolve().await?;
        let authorization = self
            .gateway
            .create_mandate(
                &ctx,
                CreateMandateRequest {
                    mandate_id,
                    external_ref: requested_ref,
                    user_id: cmd.user_id.clone(),
                    plan_id: cmd.plan_id.clone(),
                    frequency: cmd.frequency,
                    max_amount,
                    currency: price.currency.clone(),
                    return_url,
                    notify_url: self.urls.notify_url.clone(),
                },
            )
            .await?;

        let mut mandate = Mandate::pending(
            NewMandate {
                external_ref: authorization.external_ref.clone(),
                user_id: cmd.user_id,
                plan_id: cmd.plan_id,
                frequency: cmd.frequency,
                payment_method: authorization.payment_method.clone(),
                max_amount,
                currency: price.currency,
            },
            Timestamp::now(),
        )?;
        mandate.id = mandate_id;
        self.mandates.insert(&mandate).await?;

        tracing::info!(
            mandate_ref = %mandate.external_ref,
            user_id = %mandate.user_id,
            mode = %ctx.mode,
            "Mandate initiated"
        );

        Ok(InitiateMandateResult {
            mandate_id,
            external_ref: mandate.external_ref,
            authorization_url: authorization.authorization_url,
        })
    }
}
