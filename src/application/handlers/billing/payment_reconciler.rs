//! PaymentReconciler - Applies a gateway verdict to local state.
//!
//! Both reconciliation channels (webhook and browser callback) end here,
//! so they share one success routine and one failure routine. Every step
//! is an idempotent conditional write; running the same verdict twice,
//! or both channels racing, converges on the same rows.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, Correlation, Mandate, OneTimeProgramPurchase, OrderOutcome, OrderTags,
    PurchaseStatus,
};
use crate::domain::foundation::{ExternalRef, OrderId, PurchaseId, Timestamp};
use crate::ports::{BillingNotification, BillingNotifier, PurchaseRepository, StatusWrite};

use super::notifications::notify_quietly;
use super::{ActivationOutcome, MandateLifecycle, MandateTransition, SubscriptionActivator};

/// Local effect of a reconciled verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    MandateActivated {
        mandate: Mandate,
        activation: ActivationOutcome,
        /// True when this call moved the mandate out of PENDING.
        applied: bool,
    },
    MandateFailed {
        mandate: Mandate,
        applied: bool,
    },
    PurchasePaid {
        purchase: OneTimeProgramPurchase,
        applied: bool,
    },
    PurchaseFailed {
        purchase: OneTimeProgramPurchase,
        applied: bool,
    },
    /// The record already holds the opposite terminal state.
    Conflict {
        correlation: Correlation,
        current_status: String,
    },
}

impl Reconciliation {
    /// True when this call wrote something.
    pub fn applied(&self) -> bool {
        match self {
            Reconciliation::MandateActivated {
                applied,
                activation,
                ..
            } => *applied || activation.changed,
            Reconciliation::MandateFailed { applied, .. }
            | Reconciliation::PurchasePaid { applied, .. }
            | Reconciliation::PurchaseFailed { applied, .. } => *applied,
            Reconciliation::Conflict { .. } => false,
        }
    }
}

pub struct PaymentReconciler {
    lifecycle: Arc<MandateLifecycle>,
    activator: Arc<SubscriptionActivator>,
    purchases: Arc<dyn PurchaseRepository>,
    notifier: Arc<dyn BillingNotifier>,
}

impl PaymentReconciler {
    pub fn new(
        lifecycle: Arc<MandateLifecycle>,
        activator: Arc<SubscriptionActivator>,
        purchases: Arc<dyn PurchaseRepository>,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            lifecycle,
            activator,
            purchases,
            notifier,
        }
    }

    /// Applies `outcome` to the record named by `correlation`.
    ///
    /// # Errors
    ///
    /// - `MandateNotFound` / `PurchaseNotFound` - unknown correlation id
    /// - `Infrastructure` - storage failure; nothing partial is left behind
    pub async fn reconcile(
        &self,
        correlation: &Correlation,
        outcome: &OrderOutcome,
    ) -> Result<Reconciliation, BillingError> {
        match (correlation, outcome) {
            (Correlation::Mandate(reference), OrderOutcome::Paid) => {
                self.mandate_succeeded(reference).await
            }
            (Correlation::Mandate(reference), OrderOutcome::Failed { reason }) => {
                self.mandate_failed(reference, reason).await
            }
            (Correlation::Purchase(id), OrderOutcome::Paid) => self.purchase_paid(id).await,
            (Correlation::Purchase(id), OrderOutcome::Failed { reason }) => {
                self.purchase_failed(id, reason).await
            }
        }
    }

    /// True when the gateway order `order_id` was created for the record
    /// named by `correlation`. `tags` are the ones the gateway returned
    /// for that order.
    ///
    /// # Errors
    ///
    /// `PurchaseNotFound` when a purchase correlation names no row.
    pub async fn order_belongs_to(
        &self,
        correlation: &Correlation,
        order_id: &OrderId,
        tags: Option<&OrderTags>,
    ) -> Result<bool, BillingError> {
        if tags.and_then(OrderTags::correlation).as_ref() != Some(correlation) {
            return Ok(false);
        }
        match correlation {
            Correlation::Mandate(_) => Ok(true),
            Correlation::Purchase(id) => {
                let purchase = self
                    .purchases
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| BillingError::purchase_not_found(id.to_string()))?;
                Ok(purchase.order_id.as_ref() == Some(order_id))
            }
        }
    }

    async fn mandate_succeeded(
        &self,
        reference: &ExternalRef,
    ) -> Result<Reconciliation, BillingError> {
        let transition = self.lifecycle.activate(reference).await?;
        let applied = transition.is_applied();

        let mandate = match transition {
            MandateTransition::Applied(m) | MandateTransition::AlreadyInState(m) => m,
            MandateTransition::Conflict(m) => {
                return Ok(Reconciliation::Conflict {
                    correlation: Correlation::Mandate(reference.clone()),
                    current_status: m.status.to_string(),
                })
            }
        };

        // A repeat only repairs a subscription lost to a crash between the
        // two writes. It never restarts an existing period.
        let activation = if applied {
            self.activator.activate(&mandate).await?
        } else {
            self.activator.ensure_created(&mandate).await?
        };

        Ok(Reconciliation::MandateActivated {
            mandate,
            activation,
            applied,
        })
    }

    async fn mandate_failed(
        &self,
        reference: &ExternalRef,
        reason: &str,
    ) -> Result<Reconciliation, BillingError> {
        match self.lifecycle.mark_failed(reference).await? {
            MandateTransition::Applied(mandate) => {
                tracing::info!(mandate_ref = %reference, reason, "Mandate authorization failed");
                Ok(Reconciliation::MandateFailed {
                    mandate,
                    applied: true,
                })
            }
            MandateTransition::AlreadyInState(mandate) => Ok(Reconciliation::MandateFailed {
                mandate,
                applied: false,
            }),
            MandateTransition::Conflict(mandate) => Ok(Reconciliation::Conflict {
                correlation: Correlation::Mandate(reference.clone()),
                current_status: mandate.status.to_string(),
            }),
        }
    }

    async fn purchase_paid(&self, id: &PurchaseId) -> Result<Reconciliation, BillingError> {
        let write = self
            .purchases
            .settle_pending(id, PurchaseStatus::Paid, None, Timestamp::now())
            .await?;

        match write {
            StatusWrite::Updated(purchase) => {
                tracing::info!(purchase_id = %id, "Purchase paid");
                notify_quietly(
                    self.notifier.as_ref(),
                    BillingNotification::PurchaseCompleted {
                        user_id: purchase.user_id.clone(),
                        purchase_id: purchase.id,
                    },
                )
                .await;
                Ok(Reconciliation::PurchasePaid {
                    purchase,
                    applied: true,
                })
            }
            StatusWrite::Unchanged(purchase) if purchase.status == PurchaseStatus::Paid => {
                Ok(Reconciliation::PurchasePaid {
                    purchase,
                    applied: false,
                })
            }
            StatusWrite::Unchanged(purchase) => Ok(purchase_conflict(id, &purchase)),
            StatusWrite::NotFound => Err(BillingError::purchase_not_found(id.to_string())),
        }
    }

    async fn purchase_failed(
        &self,
        id: &PurchaseId,
        reason: &str,
    ) -> Result<Reconciliation, BillingError> {
        let write = self
            .purchases
            .settle_pending(id, PurchaseStatus::Failed, Some(reason), Timestamp::now())
            .await?;

        match write {
            StatusWrite::Updated(purchase) => {
                tracing::info!(purchase_id = %id, reason, "Purchase failed");
                Ok(Reconciliation::PurchaseFailed {
                    purchase,
                    applied: true,
                })
            }
            StatusWrite::Unchanged(purchase) if purchase.status == PurchaseStatus::Failed => {
                Ok(Reconciliation::PurchaseFailed {
                    purchase,
                    applied: false,
                })
            }
            StatusWrite::Unchanged(purchase) => Ok(purchase_conflict(id, &purchase)),
            StatusWrite::NotFound => Err(BillingError::purchase_not_found(id.to_string())),
        }
    }
}

fn purchase_conflict(id: &PurchaseId, purchase: &OneTimeProgramPurchase) -> Reconciliation {
    tracing::warn!(
        purchase_id = %id,
        current = %purchase.status,
        "Purchase settlement refused"
    );
    Reconciliation::Conflict {
        correlation: Correlation::Purchase(*id),
        current_status: purchase.status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::billing::test_support::{
        active_mandate, pending_mandate, Fixture, PROGRAM,
    };
    use crate::domain::billing::{MandateStatus, Subscription};
    use crate::domain::foundation::{ProductId, UserId};
    use crate::ports::PurchaseRepository;

    fn failed(reason: &str) -> OrderOutcome {
        OrderOutcome::Failed {
            reason: reason.to_string(),
        }
    }

    fn mandate_ref(reference: &str) -> Correlation {
        Correlation::Mandate(ExternalRef::new(reference).unwrap())
    }

    async fn pending_purchase(fx: &Fixture) -> OneTimeProgramPurchase {
        let purchase = OneTimeProgramPurchase::pending(
            UserId::new("user-1").unwrap(),
            ProductId::new(PROGRAM).unwrap(),
            99_900,
            "INR",
            Timestamp::now(),
        )
        .unwrap();
        PurchaseRepository::insert(fx.store.as_ref(), &purchase)
            .await
            .unwrap();
        purchase
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Mandates
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn success_activates_mandate_and_subscription() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        assert!(result.applied());
        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Active);
        assert_eq!(fx.store.subscription_count(), 1);
        assert!(fx.store.user_paid(&UserId::new("user-1").unwrap()));
    }

    #[tokio::test]
    async fn duplicate_success_changes_nothing() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));
        fx.reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();
        let before = fx.store.subscriptions();

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        assert!(!result.applied());
        assert_eq!(fx.store.subscriptions(), before);
        assert_eq!(fx.notifier.count(), 1);
    }

    #[tokio::test]
    async fn stale_failure_after_success_is_ignored() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));
        fx.reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &failed("USER_DROPPED"))
            .await
            .unwrap();

        assert!(matches!(result, Reconciliation::Conflict { .. }));
        assert_eq!(fx.store.mandate("m1").unwrap().status, MandateStatus::Active);
        assert_eq!(fx.store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn success_after_failure_does_not_revive() {
        let fx = Fixture::new();
        fx.store.insert_mandate(pending_mandate("m1", "user-1"));
        fx.reconciler
            .reconcile(&mandate_ref("m1"), &failed("declined"))
            .await
            .unwrap();

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        assert_eq!(
            result,
            Reconciliation::Conflict {
                correlation: mandate_ref("m1"),
                current_status: "failed".to_string(),
            }
        );
        assert_eq!(fx.store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn replayed_success_does_not_restart_lapsed_period() {
        let fx = Fixture::new();
        let mandate = active_mandate("m1", "user-1");
        fx.store.insert_mandate(mandate.clone());
        let lapsed = Subscription::for_activation(&mandate, Timestamp::now().add_days(-33));
        fx.store.insert_subscription(lapsed.clone());

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        assert!(!result.applied());
        assert_eq!(fx.store.subscriptions(), vec![lapsed]);
        assert!(fx.store.invoices().is_empty());
    }

    #[tokio::test]
    async fn replayed_success_repairs_missing_subscription() {
        let fx = Fixture::new();
        fx.store.insert_mandate(active_mandate("m1", "user-1"));

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("m1"), &OrderOutcome::Paid)
            .await
            .unwrap();

        assert!(result.applied());
        assert_eq!(fx.store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn unknown_mandate_is_an_error() {
        let fx = Fixture::new();

        let result = fx
            .reconciler
            .reconcile(&mandate_ref("ghost"), &OrderOutcome::Paid)
            .await;

        assert!(matches!(result, Err(BillingError::MandateNotFound(_))));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Purchases
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn purchase_paid_is_sticky() {
        let fx = Fixture::new();
        let purchase = pending_purchase(&fx).await;
        let correlation = Correlation::Purchase(purchase.id);

        let paid = fx
            .reconciler
            .reconcile(&correlation, &OrderOutcome::Paid)
            .await
            .unwrap();
        let late_failure = fx
            .reconciler
            .reconcile(&correlation, &failed("timeout"))
            .await
            .unwrap();

        assert!(paid.applied());
        assert!(matches!(late_failure, Reconciliation::Conflict { .. }));
        assert_eq!(
            fx.store.purchase(&purchase.id).unwrap().status,
            PurchaseStatus::Paid
        );
        assert_eq!(fx.notifier.count(), 1);
    }

    #[tokio::test]
    async fn purchase_failure_records_reason() {
        let fx = Fixture::new();
        let purchase = pending_purchase(&fx).await;

        fx.reconciler
            .reconcile(&Correlation::Purchase(purchase.id), &failed("card declined"))
            .await
            .unwrap();

        let stored = fx.store.purchase(&purchase.id).unwrap();
        assert_eq!(stored.status, PurchaseStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("card declined"));
    }

    #[tokio::test]
    async fn unknown_purchase_is_an_error() {
        let fx = Fixture::new();

        let result = fx
            .reconciler
            .reconcile(&Correlation::Purchase(PurchaseId::new()), &OrderOutcome::Paid)
            .await;

        assert!(matches!(result, Err(BillingError::PurchaseNotFound(_))));
    }
}
