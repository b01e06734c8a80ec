//! Notifier that emits one structured log record per notification.
//!
//! Stands in for the push/email dispatcher; downstream log shipping
//! picks the records up by the `notification` target.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::ports::{BillingNotification, BillingNotifier};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BillingNotifier for LoggingNotifier {
    async fn notify(&self, notification: BillingNotification) -> Result<(), DomainError> {
        let payload = serde_json::to_string(&notification).map_err(|e| {
            DomainError::new(
                crate::domain::foundation::ErrorCode::InternalError,
                format!("Failed to serialize notification: {}", e),
            )
        })?;
        tracing::info!(
            target: "notification",
            user_id = %notification.user_id(),
            payload = %payload,
            "Billing notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PurchaseId, UserId};

    #[tokio::test]
    async fn notify_always_succeeds() {
        let notifier = LoggingNotifier::new();
        let result = notifier
            .notify(BillingNotification::PurchaseCompleted {
                user_id: UserId::new("user-1").unwrap(),
                purchase_id: PurchaseId::new(),
            })
            .await;
        assert!(result.is_ok());
    }
}
