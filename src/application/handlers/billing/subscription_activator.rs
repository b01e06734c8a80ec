//! SubscriptionActivator - Grants the billing period for an ACTIVE mandate.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Mandate, Subscription};
use crate::domain::foundation::Timestamp;
use crate::ports::{ActivationWrite, BillingNotification, BillingNotifier, SubscriptionStore};

use super::notifications::notify_quietly;

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    pub subscription: Subscription,
    /// False when a current subscription already existed.
    pub changed: bool,
}

/// Derives or refreshes the subscription for an ACTIVE mandate.
///
/// The subscription upsert and the user's paid flag are written in one
/// store transaction. Repeating an activation while the period is still
/// running writes nothing and sends no notification.
pub struct SubscriptionActivator {
    subscriptions: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn BillingNotifier>,
}

impl SubscriptionActivator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn BillingNotifier>,
    ) -> Self {
        Self {
            subscriptions,
            notifier,
        }
    }

    pub async fn activate(&self, mandate: &Mandate) -> Result<ActivationOutcome, BillingError> {
        if !mandate.is_active() {
            return Err(BillingError::InvalidTransition(format!(
                "mandate {} is {}, not active",
                mandate.external_ref, mandate.status
            )));
        }

        let write = self.subscriptions.activate(mandate, Timestamp::now()).await?;
        let changed = write.changed();
        if let ActivationWrite::Unchanged(existing) = &write {
            tracing::debug!(
                mandate_ref = %mandate.external_ref,
                subscription_id = %existing.id,
                "Subscription already current"
            );
        }
        let subscription = write.into_subscription();

        if changed {
            tracing::info!(
                mandate_ref = %mandate.external_ref,
                subscription_id = %subscription.id,
                end_date = %subscription.end_date,
                "Subscription activated"
            );
            notify_quietly(
                self.notifier.as_ref(),
                BillingNotification::SubscriptionActivated {
                    user_id: subscription.user_id.clone(),
                    subscription_id: subscription.id,
                    end_date: subscription.end_date,
                },
            )
            .await;
        }

        Ok(ActivationOutcome {
            subscription,
            changed,
        })
    }

    /// Activates only when the mandate has no subscription yet.
    ///
    /// An existing subscription is returned untouched even when its period
    /// has lapsed; only a paid renewal may extend it.
    pub async fn ensure_created(
        &self,
        mandate: &Mandate,
    ) -> Result<ActivationOutcome, BillingError> {
        match self.subscriptions.find_by_mandate(&mandate.id).await? {
            Some(subscription) => Ok(ActivationOutcome {
                subscription,
                changed: false,
            }),
            None => self.activate(mandate).await,
        }
    }
}
