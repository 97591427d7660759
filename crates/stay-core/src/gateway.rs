//! # Payment Gateway Trait
//!
//! Strategy-pattern seam for payment providers. The booking core never
//! talks to a provider's API directly; checkout, reconciliation, and
//! refunds all go through this trait, so providers can be swapped (and
//! mocked in tests) without touching the money logic.

use crate::error::BookingResult;
use crate::money::Currency;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// One line item on a hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    /// Display name (e.g. "3 nights x Lakeside Cabin")
    pub name: String,
    /// Unit amount in minor currency units
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Request to create a hosted checkout session
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: Currency,
    /// Booking intent encoded as session metadata; the only durable record
    /// of intent until payment completes
    pub metadata: HashMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Customer email for prefill, when known
    pub customer_email: Option<String>,
}

/// A hosted checkout session created by the provider
#[derive(Debug, Clone)]
pub struct HostedSession {
    /// Provider session id (e.g. "cs_...")
    pub session_id: String,
    /// Redirect target for the hosted payment page
    pub redirect_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Card descriptor attached to a charge
#[derive(Debug, Clone, Default)]
pub struct GatewayCard {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

/// A payment intent as reported by the provider
#[derive(Debug, Clone)]
pub struct GatewayPaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub currency: Currency,
    /// Most recent charge on the intent, when one exists
    pub latest_charge_id: Option<String>,
}

/// One refund as reported by the provider
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    /// Minor currency units
    pub amount: i64,
    pub currency: Currency,
    pub status: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A charge as reported by the provider; `refunds` is the provider's
/// canonical refund set for the charge
#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub id: String,
    pub payment_intent_id: Option<String>,
    pub balance_transaction_id: Option<String>,
    /// Original captured amount in minor units
    pub amount: i64,
    /// Cumulative refunded amount in minor units
    pub amount_refunded: i64,
    pub currency: Currency,
    pub card: GatewayCard,
    pub refunds: Vec<GatewayRefund>,
}

/// Payment-completed session data carried by a webhook event
#[derive(Debug, Clone)]
pub struct SessionCompleted {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub payment_status: String,
    /// Total captured in minor units
    pub amount_total: i64,
    pub currency: Currency,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Charge-refunded data carried by a webhook event. Only the charge id is
/// trusted; the authoritative refund state is read back from the gateway.
#[derive(Debug, Clone)]
pub struct ChargeRefunded {
    pub charge_id: String,
    pub payment_intent_id: Option<String>,
    pub amount_refunded: i64,
}

/// A verified, parsed provider event
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    SessionCompleted(SessionCompleted),
    ChargeRefunded(ChargeRefunded),
    /// Recognized signature, uninteresting event kind; acknowledged as-is
    Ignored { event_type: String },
}

/// Core trait for payment provider implementations
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session carrying the booking intent as
    /// metadata. No local state is written.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BookingResult<HostedSession>;

    /// Retrieve a payment intent by id
    async fn retrieve_payment_intent(&self, intent_id: &str)
        -> BookingResult<GatewayPaymentIntent>;

    /// Retrieve a charge, including its canonical refund list
    async fn retrieve_charge(&self, charge_id: &str) -> BookingResult<GatewayCharge>;

    /// Execute a refund of exactly `amount` minor units against a payment
    /// intent. Once submitted, a refund cannot be withdrawn.
    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: i64,
        reason: Option<&str>,
    ) -> BookingResult<GatewayRefund>;

    /// Verify an authenticity signature over the raw request body and parse
    /// the event. Fails before any state change on unverifiable payloads.
    fn verify_webhook(&self, payload: &[u8], signature: &str) -> BookingResult<GatewayEvent>;

    /// Provider name (for logging and error reporting)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared gateway (dynamic dispatch)
pub type SharedGateway = Arc<dyn PaymentGateway>;
