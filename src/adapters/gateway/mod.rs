//! Payment gateway adapters.
//!
//! - `HttpPaymentGateway` - REST client for the live gateway
//! - `MockPaymentGateway` - scripted gateway for tests

mod http_gateway;
mod mock_gateway;
mod wire_types;

pub use http_gateway::HttpPaymentGateway;
pub use mock_gateway::{GatewayCall, MockPaymentGateway};
