//! Webhook work queue.
//!
//! - `ChannelWebhookQueue` - bounded tokio channel behind the `WebhookQueue` port
//! - `WebhookWorker` - background consumer running `ProcessWebhookHandler`

mod channel_queue;
mod webhook_worker;

pub use channel_queue::ChannelWebhookQueue;
pub use webhook_worker::{WebhookWorker, WebhookWorkerConfig};
