//! Fire-and-forget notification dispatch.

use crate::ports::{BillingNotification, BillingNotifier};

/// Sends a notification; failures are logged and never reach the caller.
pub(crate) async fn notify_quietly(notifier: &dyn BillingNotifier, notification: BillingNotification) {
    let user_id = notification.user_id().clone();
    if let Err(err) = notifier.notify(notification).await {
        tracing::warn!(user_id = %user_id, error = %err, "Billing notification dropped");
    }
}
