//! AcceptWebhookHandler - First half of the ack-then-process webhook flow.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::Timestamp;
use crate::ports::{WebhookDelivery, WebhookQueue};

use super::GatewayConfigResolver;

/// Raw webhook as received; nothing is parsed yet.
#[derive(Debug, Clone)]
pub struct AcceptWebhookCommand {
    pub raw_body: Vec<u8>,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

/// Captures the active signing secret and hands the delivery to the
/// webhook queue. The HTTP layer acknowledges once this returns,
/// whatever the result.
pub struct AcceptWebhookHandler {
    resolver: Arc<GatewayConfigResolver>,
    queue: Arc<dyn WebhookQueue>,
}

impl AcceptWebhookHandler {
    pub fn new(resolver: Arc<GatewayConfigResolver>, queue: Arc<dyn WebhookQueue>) -> Self {
        Self { resolver, queue }
    }

    pub async fn handle(&self, cmd: AcceptWebhookCommand) -> Result<(), BillingError> {
        let ctx = self.resolver.resolve().await?;

        let delivery = WebhookDelivery {
            raw_body: cmd.raw_body,
            signature: cmd.signature,
            timestamp: cmd.timestamp,
            secret: ctx.secret,
            received_at: Timestamp::now(),
        };
        self.queue.enqueue(delivery).await?;
        Ok(())
    }
}
