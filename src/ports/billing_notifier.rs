//! Billing notification port.
//!
//! Notifications are fire-and-forget: callers log a failed dispatch and
//! carry on. Billing state never depends on delivery.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DomainError, PurchaseId, SubscriptionId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingNotification {
    SubscriptionActivated {
        user_id: UserId,
        subscription_id: SubscriptionId,
        end_date: Timestamp,
    },
    SubscriptionRenewed {
        user_id: UserId,
        subscription_id: SubscriptionId,
        end_date: Timestamp,
    },
    RenewalChargeFailed {
        user_id: UserId,
        subscription_id: SubscriptionId,
        reason: String,
    },
    PurchaseCompleted {
        user_id: UserId,
        purchase_id: PurchaseId,
    },
}

impl BillingNotification {
    pub fn user_id(&self) -> &UserId {
        match self {
            BillingNotification::SubscriptionActivated { user_id, .. }
            | BillingNotification::SubscriptionRenewed { user_id, .. }
            | BillingNotification::RenewalChargeFailed { user_id, .. }
            | BillingNotification::PurchaseCompleted { user_id, .. } => user_id,
        }
    }
}

#[async_trait]
pub trait BillingNotifier: Send + Sync {
    async fn notify(&self, notification: BillingNotification) -> Result<(), DomainError>;
}
