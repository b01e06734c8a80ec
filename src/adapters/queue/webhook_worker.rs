//! WebhookWorker - Background consumer of acknowledged webhook deliveries.
//!
//! ## Graceful Shutdown
//!
//! On the shutdown signal the worker closes the queue, runs every
//! delivery still buffered, and waits for in-flight jobs before
//! returning. Nothing acknowledged to the gateway is dropped.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};

use crate::application::handlers::billing::{ProcessWebhookHandler, WebhookOutcome};
use crate::domain::billing::BillingError;
use crate::ports::WebhookDelivery;

type JobResult = Result<WebhookOutcome, BillingError>;

#[derive(Debug, Clone)]
pub struct WebhookWorkerConfig {
    /// Deliveries processed at the same time.
    pub max_in_flight: usize,
}

impl Default for WebhookWorkerConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

pub struct WebhookWorker {
    receiver: mpsc::Receiver<WebhookDelivery>,
    handler: Arc<ProcessWebhookHandler>,
    config: WebhookWorkerConfig,
}

impl WebhookWorker {
    pub fn new(
        receiver: mpsc::Receiver<WebhookDelivery>,
        handler: Arc<ProcessWebhookHandler>,
        config: WebhookWorkerConfig,
    ) -> Self {
        Self {
            receiver,
            handler,
            config,
        }
    }

    /// Runs until shutdown is signalled or every queue sender is gone.
    ///
    /// Returns the number of deliveries processed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        let max_in_flight = self.config.max_in_flight.max(1);
        let mut tasks: JoinSet<JobResult> = JoinSet::new();
        let mut processed = 0;

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_job(joined);
                }
                delivery = self.receiver.recv(), if tasks.len() < max_in_flight => {
                    match delivery {
                        Some(delivery) => {
                            self.spawn(&mut tasks, delivery);
                            processed += 1;
                        }
                        None => break,
                    }
                }
            }
        }

        self.receiver.close();
        while let Some(delivery) = self.receiver.recv().await {
            if tasks.len() >= max_in_flight {
                if let Some(joined) = tasks.join_next().await {
                    log_job(joined);
                }
            }
            self.spawn(&mut tasks, delivery);
            processed += 1;
        }
        while let Some(joined) = tasks.join_next().await {
            log_job(joined);
        }

        tracing::info!(processed, "Webhook worker stopped");
        processed
    }

    fn spawn(&self, tasks: &mut JoinSet<JobResult>, delivery: WebhookDelivery) {
        let handler = Arc::clone(&self.handler);
        tasks.spawn(async move { handler.handle(delivery).await });
    }
}

fn log_job(joined: Result<JobResult, JoinError>) {
    match joined {
        Ok(Ok(outcome)) => tracing::debug!(outcome = ?outcome, "Webhook processed"),
        Ok(Err(err)) => tracing::error!(error = %err, "Webhook processing failed"),
        Err(err) => tracing::error!(error = %err, "Webhook job aborted"),
    }
}
