//! Detached webhook work port.
//!
//! The webhook endpoint acknowledges the gateway and hands the raw
//! delivery to a queue. Everything after the acknowledgment (signature
//! check, parsing, state changes) runs from the queue.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::foundation::{DomainError, Timestamp};

/// One received webhook delivery, exactly as it arrived.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub raw_body: Vec<u8>,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    /// Secret of the environment active when the delivery arrived.
    pub secret: SecretString,
    pub received_at: Timestamp,
}

#[async_trait]
pub trait WebhookQueue: Send + Sync {
    /// Queues a delivery for processing.
    ///
    /// # Errors
    ///
    /// `InternalError` when the queue no longer accepts work (shutdown).
    async fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), DomainError>;
}
