//! Billing domain module.
//!
//! Mandates, subscriptions, invoices and one-time purchases, plus the
//! pure pieces of gateway reconciliation (event classification and
//! signature checks).
//!
//! # Module Structure
//!
//! - `mandate` - Mandate entity and PENDING → ACTIVE/FAILED state machine
//! - `subscription` - Billing period arithmetic and read-time expiry
//! - `invoice` - Append-only charge records
//! - `gateway_event` - Webhook payloads and order-status mapping
//! - `signature` - HMAC-SHA256 webhook verification

mod errors;
mod frequency;
mod gateway_event;
mod gateway_mode;
mod invoice;
mod mandate;
mod plan;
mod purchase;
mod signature;
mod subscription;

pub use errors::BillingError;
pub use frequency::BillingFrequency;
pub use gateway_event::{Correlation, GatewayWebhook, OrderOutcome, OrderTags, WebhookEventKind};
pub use gateway_mode::GatewayMode;
pub use invoice::{InvoiceStatus, SubscriptionInvoice};
pub use mandate::{Mandate, MandateStatus, NewMandate};
pub use plan::{PlanPrice, ProgramPrice};
pub use purchase::{OneTimeProgramPurchase, PurchaseStatus};
pub use signature::{sign, SignatureError, WebhookSignatureVerifier};
pub use subscription::{Subscription, SubscriptionStatus};
