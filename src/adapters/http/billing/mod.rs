//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/webhooks/gateway` - Gateway webhook, acknowledged then queued
//! - `GET /api/billing/callback` - Browser return, always a redirect
//! - `POST /api/billing/recurring/run` - Renewal pass for an external cron
//! - `POST /api/billing/mandates` - Start a mandate authorization
//! - `POST /api/billing/purchases` - Checkout for a one-time program
//! - `GET /api/billing/subscription` - Current subscription view
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingAppState, BillingPorts, BillingSettings, RedirectTargets};
pub use routes::billing_router;
