//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `MandateRepository` - Mandates and their conditional status writes
//! - `SubscriptionStore` - Subscriptions, invoices and the paid flag
//! - `PurchaseRepository` - One-time program purchases
//! - `PriceCatalog` - Read-only plan and program prices
//! - `GatewayConfigStore` - Sandbox/production switch
//!
//! ## Integration Ports
//!
//! - `PaymentGateway` - Outbound gateway calls
//! - `BillingNotifier` - Fire-and-forget user notifications
//! - `WebhookQueue` - Detached processing of acknowledged webhooks

mod billing_notifier;
mod gateway_config_store;
mod mandate_repository;
mod payment_gateway;
mod price_catalog;
mod purchase_repository;
mod subscription_store;
mod webhook_queue;

pub use billing_notifier::{BillingNotification, BillingNotifier};
pub use gateway_config_store::GatewayConfigStore;
pub use mandate_repository::{MandateRepository, StatusWrite};
pub use payment_gateway::{
    ChargeOutcome, ChargeRequest, CheckoutOrder, CreateMandateRequest, CreateOrderRequest,
    GatewayContext, MandateAuthorization, OrderSnapshot, PaymentError, PaymentErrorCode,
    PaymentGateway,
};
pub use price_catalog::PriceCatalog;
pub use purchase_repository::PurchaseRepository;
pub use subscription_store::{ActivationWrite, RenewalWrite, SubscriptionStore};
pub use webhook_queue::{WebhookDelivery, WebhookQueue};
