//! # stay-stripe
//!
//! Stripe payment gateway for stayflow-rs.
//!
//! Implements the core `PaymentGateway` trait against Stripe's REST API
//! using hosted Checkout Sessions:
//!
//! - **Checkout sessions** - dynamic line items built from a stay's price
//!   breakdown, with the booking intent carried as session metadata
//! - **Webhooks** - HMAC-SHA256 signature verification and parsing of
//!   `checkout.session.completed` and `charge.refunded` events
//! - **Reads** - payment intents and charges (with expanded refund lists)
//!   for reconciliation
//! - **Refunds** - partial and full refunds against a payment intent
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stay_stripe::StripeGateway;
//! use stay_core::PaymentGateway;
//!
//! // Create gateway from environment
//! let gateway = StripeGateway::from_env()?;
//!
//! // Create a hosted checkout session
//! let session = gateway.create_checkout_session(&request).await?;
//!
//! // Redirect the guest to session.redirect_url
//! ```

pub mod config;
pub mod gateway;
pub mod webhook;

// Re-exports
pub use config::StripeConfig;
pub use gateway::StripeGateway;
pub use webhook::HANDLED_WEBHOOK_EVENTS;
