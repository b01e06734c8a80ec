//! Bounded in-process webhook queue.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{WebhookDelivery, WebhookQueue};

/// Sending half of the webhook queue.
///
/// `enqueue` waits for capacity when the queue is full, so a burst of
/// deliveries slows the acknowledgment instead of dropping work.
#[derive(Clone)]
pub struct ChannelWebhookQueue {
    sender: mpsc::Sender<WebhookDelivery>,
}

impl ChannelWebhookQueue {
    /// Creates the queue and the receiver a [`super::WebhookWorker`] consumes.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<WebhookDelivery>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WebhookQueue for ChannelWebhookQueue {
    async fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), DomainError> {
        self.sender.send(delivery).await.map_err(|_| {
            DomainError::new(ErrorCode::InternalError, "webhook queue is closed")
        })
    }
}
