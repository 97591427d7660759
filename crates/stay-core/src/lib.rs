//! # stay-core
//!
//! Core types and logic for the stayflow booking engine.
//!
//! This crate provides:
//! - `pricing` — the pure stay-pricing engine (tax profiles, jurisdiction
//!   fallbacks, deterministic breakdowns)
//! - `checkout` — booking validation and hosted-checkout orchestration
//! - `reconcile` — the webhook reconciliation state machine
//! - `refund` — operator-triggered refunds against the refund ledger
//! - `PaymentGateway`, `ReservationStore`, `ListingDirectory` trait seams
//!   for providers, persistence, and collaborator lookups
//! - `BookingError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use stay_core::checkout::{BookingRequest, CheckoutOrchestrator, CheckoutUrls};
//!
//! let orchestrator = CheckoutOrchestrator::new(gateway, listings, tax_profiles, urls);
//! let session = orchestrator.create_checkout(&request).await?;
//! // Redirect the guest to session.redirect_url; the reservation row is
//! // created later, by webhook reconciliation, once payment settles.
//! ```

pub mod checkout;
pub mod error;
pub mod gateway;
pub mod listing;
pub mod money;
pub mod pricing;
pub mod reconcile;
pub mod refund;
pub mod reservation;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use checkout::{BookingIntent, BookingRequest, CheckoutOrchestrator, CheckoutUrls};
pub use error::{BookingError, BookingResult};
pub use gateway::{
    ChargeRefunded, CheckoutSessionRequest, GatewayCard, GatewayCharge, GatewayEvent,
    GatewayPaymentIntent, GatewayRefund, HostedSession, PaymentGateway, SessionCompleted,
    SessionLineItem, SharedGateway,
};
pub use listing::{
    ListingCatalog, ListingDirectory, ListingSnapshot, SharedListings, SharedTaxProfiles,
    TaxProfileCatalog, TaxProfileDirectory,
};
pub use money::Currency;
pub use pricing::{quote_stay, PriceBreakdown, PriceLine, StayPricing, TaxBase, TaxLine, TaxProfile};
pub use reconcile::{ReconcileOutcome, WebhookReconciler};
pub use refund::{RefundCoordinator, RefundOutcome};
pub use reservation::{
    CardSummary, GuestCounts, RefundRecord, RefundStatus, Reservation,
};
pub use store::{MemoryReservationStore, ReservationStore, SharedStore};
