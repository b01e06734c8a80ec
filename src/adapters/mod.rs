//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `gateway` - Payment gateway over REST, plus a scriptable mock
//! - `http` - Axum routes for webhooks, callbacks and the billing API
//! - `memory` - In-memory storage for tests and local runs
//! - `notify` - Billing notification sinks
//! - `postgres` - PostgreSQL storage
//! - `queue` - Webhook work queue and its worker

pub mod gateway;
pub mod http;
pub mod memory;
pub mod notify;
pub mod postgres;
pub mod queue;

pub use gateway::{HttpPaymentGateway, MockPaymentGateway};
pub use memory::InMemoryBillingStore;
pub use notify::{LoggingNotifier, RecordingNotifier};
pub use queue::{ChannelWebhookQueue, WebhookWorker, WebhookWorkerConfig};
