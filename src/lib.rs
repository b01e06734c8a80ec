//! Mandate Billing - Recurring billing core for gateway mandates
//!
//! This crate reconciles asynchronous payment-gateway signals (webhooks
//! and browser callbacks) into mandate, subscription and invoice state,
//! and renews active mandates on a schedule.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
