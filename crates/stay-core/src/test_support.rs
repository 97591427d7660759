//! Shared fixtures and a scripted in-memory gateway for unit tests.

use crate::error::{BookingError, BookingResult};
use crate::gateway::{
    CheckoutSessionRequest, GatewayCard, GatewayCharge, GatewayEvent, GatewayPaymentIntent,
    GatewayRefund, HostedSession, PaymentGateway,
};
use crate::listing::ListingSnapshot;
use crate::money::Currency;
use crate::reservation::{CardSummary, GuestCounts, RefundStatus, Reservation};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

pub(crate) fn settled_reservation(session_id: &str, amount_paid: i64) -> Reservation {
    Reservation {
        id: Uuid::new_v4(),
        guest_id: "guest_1".to_string(),
        listing_id: "cabin-1".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 9, 4).unwrap(),
        nights: 3,
        guests: GuestCounts {
            adults: 2,
            children: 0,
            infants: 0,
        },
        nightly_rate: 100,
        nightly_subtotal: 300,
        cleaning_fee: 50,
        service_fee: 20,
        subtotal: 370,
        tax_rate: 6.49,
        tax_amount: 24,
        total_price: 394,
        checkout_session_id: session_id.to_string(),
        payment_intent_id: Some("pi_123".to_string()),
        charge_id: Some("ch_123".to_string()),
        balance_transaction_id: Some("txn_123".to_string()),
        payment_status: "paid".to_string(),
        currency: Currency::USD,
        amount_paid,
        card: CardSummary {
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
        },
        refunded_amount: 0,
        refund_status: RefundStatus::None,
        refund_ids: Vec::new(),
        refund_history: Vec::new(),
        version: 0,
        created_at: Utc::now(),
    }
}

pub(crate) fn cabin_listing() -> ListingSnapshot {
    ListingSnapshot {
        id: "cabin-1".to_string(),
        name: "Lakeside Cabin".to_string(),
        location: Some("Nashville, TN".to_string()),
        nightly_rate: 100.0,
        cleaning_fee: 50.0,
        service_fee: 20.0,
        fallback_tax_rate: 7.0,
        min_nights: 1,
        tax_profile_id: None,
    }
}

pub(crate) fn gateway_refund(id: &str, amount: i64) -> GatewayRefund {
    GatewayRefund {
        id: id.to_string(),
        amount,
        currency: Currency::USD,
        status: "succeeded".to_string(),
        reason: None,
        created_at: Utc::now(),
    }
}

/// Scripted gateway: responses are queued up front, calls are recorded.
#[derive(Default)]
pub(crate) struct MockGateway {
    pub sessions: Mutex<Vec<HostedSession>>,
    pub last_session_request: Mutex<Option<CheckoutSessionRequest>>,
    pub intents: Mutex<HashMap<String, GatewayPaymentIntent>>,
    pub charges: Mutex<HashMap<String, GatewayCharge>>,
    pub refund_results: Mutex<Vec<BookingResult<GatewayRefund>>>,
    pub refund_calls: Mutex<Vec<(String, i64)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_session(&self, session: HostedSession) {
        self.sessions.lock().unwrap().push(session);
    }

    pub fn put_intent(&self, intent: GatewayPaymentIntent) {
        self.intents.lock().unwrap().insert(intent.id.clone(), intent);
    }

    pub fn put_charge(&self, charge: GatewayCharge) {
        self.charges.lock().unwrap().insert(charge.id.clone(), charge);
    }

    pub fn queue_refund(&self, result: BookingResult<GatewayRefund>) {
        self.refund_results.lock().unwrap().push(result);
    }
}

pub(crate) fn paid_intent(id: &str, charge_id: &str, amount: i64) -> GatewayPaymentIntent {
    GatewayPaymentIntent {
        id: id.to_string(),
        status: "succeeded".to_string(),
        amount,
        currency: Currency::USD,
        latest_charge_id: Some(charge_id.to_string()),
    }
}

pub(crate) fn visa_charge(id: &str, amount: i64) -> GatewayCharge {
    GatewayCharge {
        id: id.to_string(),
        payment_intent_id: Some("pi_123".to_string()),
        balance_transaction_id: Some("txn_123".to_string()),
        amount,
        amount_refunded: 0,
        currency: Currency::USD,
        card: GatewayCard {
            brand: Some("visa".to_string()),
            last4: Some("4242".to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
        },
        refunds: Vec::new(),
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> BookingResult<HostedSession> {
        *self.last_session_request.lock().unwrap() = Some(request.clone());
        self.sessions
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| BookingError::Internal("no scripted session".to_string()))
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
    ) -> BookingResult<GatewayPaymentIntent> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| BookingError::Gateway {
                provider: "mock".to_string(),
                message: format!("no such intent: {intent_id}"),
            })
    }

    async fn retrieve_charge(&self, charge_id: &str) -> BookingResult<GatewayCharge> {
        self.charges
            .lock()
            .unwrap()
            .get(charge_id)
            .cloned()
            .ok_or_else(|| BookingError::Gateway {
                provider: "mock".to_string(),
                message: format!("no such charge: {charge_id}"),
            })
    }

    async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount: i64,
        _reason: Option<&str>,
    ) -> BookingResult<GatewayRefund> {
        self.refund_calls
            .lock()
            .unwrap()
            .push((payment_intent_id.to_string(), amount));
        let mut results = self.refund_results.lock().unwrap();
        if results.is_empty() {
            return Err(BookingError::Internal("no scripted refund".to_string()));
        }
        results.remove(0)
    }

    fn verify_webhook(&self, _payload: &[u8], _signature: &str) -> BookingResult<GatewayEvent> {
        Err(BookingError::Internal(
            "mock gateway does not verify webhooks".to_string(),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
