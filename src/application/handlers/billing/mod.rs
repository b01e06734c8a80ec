//! Billing handlers.
//!
//! ## Reconciliation core
//! - `GatewayConfigResolver` - active gateway environment, read per call
//! - `MandateLifecycle` - the only writer of mandate status
//! - `SubscriptionActivator` - subscription upsert and paid flag
//! - `PaymentReconciler` - shared success/failure routine for both channels
//!
//! ## Entry points
//! - Webhooks: `AcceptWebhookHandler` acknowledges, `ProcessWebhookHandler`
//!   runs detached on the webhook queue
//! - Browser return: `ReconcileCallbackHandler`
//! - Renewals: `RecurringBillingScheduler`
//!
//! ## Setup and queries
//! - `InitiateMandateHandler`, `CreatePurchaseHandler`, `GetSubscriptionHandler`

mod accept_webhook;
mod callback_urls;
mod create_purchase;
mod gateway_resolver;
mod get_subscription;
mod initiate_mandate;
mod mandate_lifecycle;
mod notifications;
mod payment_reconciler;
mod process_webhook;
mod reconcile_callback;
mod recurring_billing;
mod subscription_activator;

#[cfg(test)]
pub(crate) mod test_support;

pub use accept_webhook::{AcceptWebhookCommand, AcceptWebhookHandler};
pub use callback_urls::CallbackUrls;
pub use create_purchase::{CreatePurchaseCommand, CreatePurchaseHandler, CreatePurchaseResult};
pub use gateway_resolver::GatewayConfigResolver;
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery, SubscriptionView};
pub use initiate_mandate::{InitiateMandateCommand, InitiateMandateHandler, InitiateMandateResult};
pub use mandate_lifecycle::{MandateLifecycle, MandateTransition};
pub use payment_reconciler::{PaymentReconciler, Reconciliation};
pub use process_webhook::{ProcessWebhookHandler, WebhookOutcome};
pub use reconcile_callback::{
    CallbackQuery, CallbackResult, ReconcileCallbackHandler, REASON_MISSING_IDS,
    REASON_ORDER_MISMATCH, REASON_SERVER_ERROR,
};
pub use recurring_billing::{
    ChargeStatus, MandateRunResult, RecurringBillingConfig, RecurringBillingScheduler,
    RecurringRunReport,
};
pub use subscription_activator::{ActivationOutcome, SubscriptionActivator};
