//! RecurringBillingScheduler - Charges ACTIVE mandates that are due.
//!
//! Triggered externally (cron hitting the recurring-run endpoint). Every
//! mandate is processed on its own: one mandate's error is recorded in
//! its result row and never aborts the batch. Nothing is retried inline;
//! the next run picks up whatever is still due.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::billing::{
    BillingError, Mandate, PlanPrice, Subscription, SubscriptionInvoice, SubscriptionStatus,
};
use crate::domain::foundation::{InvoiceId, MandateId, Timestamp};
use crate::ports::{
    BillingNotification, BillingNotifier, ChargeOutcome, ChargeRequest, GatewayContext,
    MandateRepository, PaymentGateway, PriceCatalog, RenewalWrite, SubscriptionStore,
};

use super::notifications::notify_quietly;
use super::{GatewayConfigResolver, SubscriptionActivator};

pub const REASON_OVER_MANDATE_CAP: &str = "amount_exceeds_mandate_cap";
pub const REASON_NOT_DUE: &str = "not_due";
pub const REASON_CANCELLATION_PENDING: &str = "cancellation_pending";
pub const REASON_RENEWAL_IN_PROGRESS: &str = "renewal_in_progress";

/// How long a renewal claim blocks other runs before it counts as
/// abandoned.
pub const RENEWAL_CLAIM_LEASE_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Paid,
    Failed,
    Skipped,
    Repaired,
    Error,
}

/// Outcome for one mandate in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandateRunResult {
    pub mandate_id: MandateId,
    pub charge: ChargeStatus,
    pub invoice_id: Option<InvoiceId>,
    pub transaction_id: Option<String>,
    pub end_date: Option<Timestamp>,
    pub reason: Option<String>,
}

impl MandateRunResult {
    fn new(mandate: &Mandate, charge: ChargeStatus) -> Self {
        Self {
            mandate_id: mandate.id,
            charge,
            invoice_id: None,
            transaction_id: None,
            end_date: None,
            reason: None,
        }
    }

    fn with_invoice(mut self, invoice: &SubscriptionInvoice) -> Self {
        self.invoice_id = Some(invoice.id);
        self.transaction_id = Some(invoice.external_transaction_id.clone());
        self.reason = invoice.failure_reason.clone();
        self
    }

    fn with_end_date(mut self, end_date: Timestamp) -> Self {
        self.end_date = Some(end_date);
        self
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurringRunReport {
    pub results: Vec<MandateRunResult>,
}

impl RecurringRunReport {
    pub fn count(&self, status: ChargeStatus) -> usize {
        self.results.iter().filter(|r| r.charge == status).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecurringBillingConfig {
    /// Subscriptions ending within this many days are charged.
    pub renewal_lead_days: i64,
    /// Mandates charged at the same time.
    pub concurrency: usize,
}

impl Default for RecurringBillingConfig {
    fn default() -> Self {
        Self {
            renewal_lead_days: 1,
            concurrency: 4,
        }
    }
}

pub struct RecurringBillingScheduler {
    mandates: Arc<dyn MandateRepository>,
    subscriptions: Arc<dyn SubscriptionStore>,
    catalog: Arc<dyn PriceCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: Arc<GatewayConfigResolver>,
    activator: Arc<SubscriptionActivator>,
    notifier: Arc<dyn BillingNotifier>,
    config: RecurringBillingConfig,
}

impl RecurringBillingScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mandates: Arc<dyn MandateRepository>,
        subscriptions: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn PriceCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        resolver: Arc<GatewayConfigResolver>,
        activator: Arc<SubscriptionActivator>,
        notifier: Arc<dyn BillingNotifier>,
        config: RecurringBillingConfig,
    ) -> Self {
        Self {
            mandates,
            subscriptions,
            catalog,
            gateway,
            resolver,
            activator,
            notifier,
            config,
        }
    }

    /// Runs one billing pass as of `now`.
    ///
    /// # Errors
    ///
    /// Only when the batch cannot start: listing mandates or resolving
    /// the gateway failed. Per-mandate failures are in the report.
    pub async fn run(&self, now: Timestamp) -> Result<RecurringRunReport, BillingError> {
        let mandates = self.mandates.list_active().await?;
        let ctx = self.resolver.resolve().await?;
        let horizon = now.add_days(self.config.renewal_lead_days);

        tracing::info!(
            mandates = mandates.len(),
            mode = %ctx.mode,
            horizon = %horizon,
            "Recurring billing run started"
        );

        let results: Vec<MandateRunResult> = stream::iter(mandates)
            .map(|mandate| {
                let ctx = &ctx;
                async move { self.process(mandate, ctx, now, horizon).await }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = RecurringRunReport { results };
        tracing::info!(
            paid = report.count(ChargeStatus::Paid),
            failed = report.count(ChargeStatus::Failed),
            skipped = report.count(ChargeStatus::Skipped),
            repaired = report.count(ChargeStatus::Repaired),
            errors = report.count(ChargeStatus::Error),
            "Recurring billing run finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        mandate: Mandate,
        ctx: &GatewayContext,
        now: Timestamp,
        horizon: Timestamp,
    ) -> MandateRunResult {
        match self.charge_if_due(&mandate, ctx, now, horizon).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    mandate_ref = %mandate.external_ref,
                    error = %err,
                    "Recurring charge aborted"
                );
                MandateRunResult::new(&mandate, ChargeStatus::Error).with_reason(err.to_string())
            }
        }
    }

    async fn charge_if_due(
        &self,
        mandate: &Mandate,
        ctx: &GatewayContext,
        now: Timestamp,
        horizon: Timestamp,
    ) -> Result<MandateRunResult, BillingError> {
        let Some(subscription) = self.subscriptions.find_by_mandate(&mandate.id).await? else {
            // ACTIVE mandate whose activation never completed.
            let activation = self.activator.activate(mandate).await?;
            tracing::warn!(mandate_ref = %mandate.external_ref, "Missing subscription repaired");
            return Ok(MandateRunResult::new(mandate, ChargeStatus::Repaired)
                .with_end_date(activation.subscription.end_date));
        };

        if subscription.status == SubscriptionStatus::CancellationPending {
            return Ok(MandateRunResult::new(mandate, ChargeStatus::Skipped)
                .with_end_date(subscription.end_date)
                .with_reason(REASON_CANCELLATION_PENDING));
        }
        if !subscription.is_due(horizon) {
            return Ok(MandateRunResult::new(mandate, ChargeStatus::Skipped)
                .with_end_date(subscription.end_date)
                .with_reason(REASON_NOT_DUE));
        }

        let stale_before = now.add_minutes(-RENEWAL_CLAIM_LEASE_MINUTES);
        let claimed = self
            .subscriptions
            .claim_renewal(&subscription.id, subscription.end_date, now, stale_before)
            .await?;
        if !claimed {
            tracing::info!(
                mandate_ref = %mandate.external_ref,
                end_date = %subscription.end_date,
                "Renewal already claimed by another run"
            );
            return Ok(MandateRunResult::new(mandate, ChargeStatus::Skipped)
                .with_end_date(subscription.end_date)
                .with_reason(REASON_RENEWAL_IN_PROGRESS));
        }

        let subscription_id = subscription.id;
        let result = self.charge_claimed(mandate, subscription, ctx, now).await;
        if let Err(err) = self.subscriptions.release_renewal(&subscription_id).await {
            // The lease runs out on its own.
            tracing::warn!(
                mandate_ref = %mandate.external_ref,
                error = %err,
                "Renewal claim not released"
            );
        }
        result
    }

    /// Charges a period this run holds the claim for.
    async fn charge_claimed(
        &self,
        mandate: &Mandate,
        subscription: Subscription,
        ctx: &GatewayContext,
        now: Timestamp,
    ) -> Result<MandateRunResult, BillingError> {
        let price = self
            .catalog
            .plan_price(&mandate.plan_id)
            .await?
            .ok_or_else(|| BillingError::plan_not_found(mandate.plan_id.as_str()))?;

        let charge_id = format!("chg_{}", Uuid::new_v4().simple());

        if !mandate.covers(price.total()) {
            tracing::warn!(
                mandate_ref = %mandate.external_ref,
                total = price.total(),
                max_amount = mandate.max_amount,
                "Plan price exceeds mandate cap"
            );
            return self
                .record_failure(mandate, &subscription, &price, charge_id, REASON_OVER_MANDATE_CAP, now)
                .await;
        }

        let request = ChargeRequest {
            charge_id: charge_id.clone(),
            external_ref: mandate.external_ref.clone(),
            amount: price.total(),
            currency: price.currency.clone(),
            payment_method: mandate.payment_method.clone(),
        };

        match self.gateway.charge_mandate(ctx, request).await {
            Ok(ChargeOutcome::Succeeded { transaction_id }) => {
                self.record_success(mandate, subscription, &price, transaction_id, now)
                    .await
            }
            Ok(ChargeOutcome::Declined {
                transaction_id,
                reason,
            }) => {
                self.record_failure(mandate, &subscription, &price, transaction_id, &reason, now)
                    .await
            }
            Err(err) => {
                let reason = format!("gateway_error: {}", err);
                self.record_failure(mandate, &subscription, &price, charge_id, &reason, now)
                    .await
            }
        }
    }

    async fn record_success(
        &self,
        mandate: &Mandate,
        subscription: Subscription,
        price: &PlanPrice,
        transaction_id: String,
        now: Timestamp,
    ) -> Result<MandateRunResult, BillingError> {
        let previous_end = subscription.end_date;
        let mut renewed = subscription;
        renewed.renew(mandate.frequency, now);
        let invoice = SubscriptionInvoice::paid(&renewed, price, transaction_id, now);

        let stored = match self
            .subscriptions
            .record_renewal(&renewed, previous_end, &invoice)
            .await?
        {
            RenewalWrite::Renewed(stored) => {
                tracing::info!(
                    mandate_ref = %mandate.external_ref,
                    transaction_id = %invoice.external_transaction_id,
                    end_date = %stored.end_date,
                    "Subscription renewed"
                );
                notify_quietly(
                    self.notifier.as_ref(),
                    BillingNotification::SubscriptionRenewed {
                        user_id: stored.user_id.clone(),
                        subscription_id: stored.id,
                        end_date: stored.end_date,
                    },
                )
                .await;
                stored
            }
            RenewalWrite::Superseded(current) => {
                tracing::warn!(
                    mandate_ref = %mandate.external_ref,
                    transaction_id = %invoice.external_transaction_id,
                    "Renewal superseded by a concurrent run; invoice kept"
                );
                current
            }
        };

        Ok(MandateRunResult::new(mandate, ChargeStatus::Paid)
            .with_invoice(&invoice)
            .with_end_date(stored.end_date))
    }

    async fn record_failure(
        &self,
        mandate: &Mandate,
        subscription: &Subscription,
        price: &PlanPrice,
        transaction_id: String,
        reason: &str,
        now: Timestamp,
    ) -> Result<MandateRunResult, BillingError> {
        let invoice = SubscriptionInvoice::failed(subscription, price, transaction_id, reason, now);
        let inserted = self.subscriptions.record_failed_charge(&invoice).await?;
        if !inserted {
            tracing::debug!(
                transaction_id = %invoice.external_transaction_id,
                "Failed invoice already recorded"
            );
        }

        tracing::warn!(mandate_ref = %mandate.external_ref, reason, "Recurring charge failed");
        notify_quietly(
            self.notifier.as_ref(),
            BillingNotification::RenewalChargeFailed {
                user_id: subscription.user_id.clone(),
                subscription_id: subscription.id,
                reason: reason.to_string(),
            },
        )
        .await;

        Ok(MandateRunResult::new(mandate, ChargeStatus::Failed)
            .with_invoice(&invoice)
            .with_end_date(subscription.end_date))
    }
}
