//! EcoMaggie fulfillment - order status reconciliation core
//!
//! Keeps marketplace orders consistent with the shipping and payment
//! providers: webhook normalization, an explicit forward-only status
//! lifecycle, scheduled reconciliation polls, and customer delivery
//! confirmation.

pub mod clients;
pub mod config;
pub mod handlers;
pub mod interfaces;
pub mod order;
pub mod services;
pub mod storage;
pub mod utils;
pub mod webhooks;
