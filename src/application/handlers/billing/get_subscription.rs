//! GetSubscriptionHandler - Query handler for a user's current subscription.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, Subscription, SubscriptionStatus};
use crate::domain::foundation::{PlanId, SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionStore;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
}

/// Subscription as observed now; lapsed periods read as expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub subscription_id: SubscriptionId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub renewed_at: Option<Timestamp>,
    pub is_paid: bool,
}

impl SubscriptionView {
    pub fn at(subscription: Subscription, now: Timestamp) -> Self {
        Self {
            status: subscription.effective_status(now),
            is_paid: subscription.grants_access(now),
            subscription_id: subscription.id,
            plan_id: subscription.plan_id,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
            renewed_at: subscription.renewed_at,
        }
    }
}

pub struct GetSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl GetSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<Option<SubscriptionView>, BillingError> {
        let latest = self
            .subscriptions
            .find_latest_for_user(&query.user_id)
            .await?;
        Ok(latest.map(|s| SubscriptionView::at(s, Timestamp::now())))
    }
}
