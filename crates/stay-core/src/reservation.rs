//! # Reservation Types
//!
//! The durable record of a completed-or-completing booking. A reservation is
//! created only by webhook reconciliation, on the first successful
//! payment-completed event for a checkout session; it is never created by
//! the checkout orchestrator and never deleted by this core.

use crate::money::Currency;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Guest-count breakdown for a stay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCounts {
    #[serde(default)]
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub infants: u32,
}

impl GuestCounts {
    pub fn total(&self) -> u32 {
        self.adults + self.children + self.infants
    }
}

/// Card descriptor for display (never the full PAN)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u32>,
}

impl CardSummary {
    pub fn is_empty(&self) -> bool {
        self.brand.is_none() && self.last4.is_none()
    }
}

/// Aggregate refund state of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Nothing refunded
    None,
    /// Some, but not all, of the captured amount refunded
    PartiallyRefunded,
    /// Captured amount fully refunded
    Refunded,
}

impl Default for RefundStatus {
    fn default() -> Self {
        RefundStatus::None
    }
}

/// Derive the aggregate refund status from the amounts.
///
/// Invariant: `Refunded ⇔ refunded_amount ≥ amount_paid` (for non-zero paid).
pub fn refund_status_for(refunded_amount: i64, amount_paid: i64) -> RefundStatus {
    if refunded_amount <= 0 {
        RefundStatus::None
    } else if refunded_amount >= amount_paid {
        RefundStatus::Refunded
    } else {
        RefundStatus::PartiallyRefunded
    }
}

/// One entry of the append-only refund history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    /// Provider refund id (e.g. "re_...")
    pub id: String,
    /// Refunded amount in minor currency units
    pub amount: i64,
    pub currency: Currency,
    /// Provider-reported status (e.g. "succeeded")
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RefundRecord {
    /// Ledger entry for a refund as reported by the gateway
    pub fn from_gateway(refund: &crate::gateway::GatewayRefund) -> Self {
        Self {
            id: refund.id.clone(),
            amount: refund.amount,
            currency: refund.currency,
            status: refund.status.clone(),
            reason: refund.reason.clone(),
            created_at: refund.created_at,
        }
    }
}

/// One booking attempt that completed payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation id (generated at settlement)
    pub id: Uuid,

    /// Guest and listing references (owned by external collaborators)
    pub guest_id: String,
    pub listing_id: String,

    /// Stay dates and derived night count
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nights: u32,
    pub guests: GuestCounts,

    /// Price components in whole currency units, re-derived at settlement
    pub nightly_rate: i64,
    pub nightly_subtotal: i64,
    pub cleaning_fee: i64,
    pub service_fee: i64,
    pub subtotal: i64,
    /// Aggregate tax as a percentage of the subtotal
    pub tax_rate: f64,
    pub tax_amount: i64,
    pub total_price: i64,

    /// Payment-provider correlation ids; each optional until payment
    /// details are enriched
    pub checkout_session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_transaction_id: Option<String>,

    /// Provider-reported payment status (e.g. "paid")
    pub payment_status: String,
    pub currency: Currency,
    /// Amount actually captured, in minor currency units
    pub amount_paid: i64,
    #[serde(default, skip_serializing_if = "CardSummary::is_empty")]
    pub card: CardSummary,

    /// Refund aggregate; minor currency units
    pub refunded_amount: i64,
    pub refund_status: RefundStatus,
    /// Ordered provider refund ids
    pub refund_ids: Vec<String>,
    /// Append-only refund detail history
    pub refund_history: Vec<RefundRecord>,

    /// Optimistic-concurrency version; bumped on every store update
    pub version: u64,

    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Refundable remainder in minor units, clamped at zero
    pub fn remaining_refundable(&self) -> i64 {
        (self.amount_paid - self.refunded_amount).max(0)
    }

    /// Append an operator-initiated refund to the ledger and update the
    /// aggregate. Callers validate the amount against the remainder first.
    pub fn append_refund(&mut self, record: RefundRecord) {
        self.refunded_amount += record.amount;
        self.refund_status = refund_status_for(self.refunded_amount, self.amount_paid);
        self.refund_ids.push(record.id.clone());
        self.refund_history.push(record);
    }

    /// Replace the refund ledger with the provider's canonical refund set
    /// for the charge, as read back from the gateway.
    pub fn replace_refund_ledger(&mut self, total_refunded: i64, refunds: Vec<RefundRecord>) {
        self.refunded_amount = total_refunded;
        self.refund_status = refund_status_for(total_refunded, self.amount_paid);
        self.refund_ids = refunds.iter().map(|r| r.id.clone()).collect();
        self.refund_history = refunds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_reservation(amount_paid: i64) -> Reservation {
        crate::test_support::settled_reservation("cs_123", amount_paid)
    }

    fn record(id: &str, amount: i64) -> RefundRecord {
        RefundRecord {
            id: id.to_string(),
            amount,
            currency: Currency::USD,
            status: "succeeded".to_string(),
            reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_refund_status_derivation() {
        assert_eq!(refund_status_for(0, 39400), RefundStatus::None);
        assert_eq!(refund_status_for(10000, 39400), RefundStatus::PartiallyRefunded);
        assert_eq!(refund_status_for(39400, 39400), RefundStatus::Refunded);
        assert_eq!(refund_status_for(40000, 39400), RefundStatus::Refunded);
    }

    #[test]
    fn test_append_refund_updates_aggregate_and_ledger() {
        let mut reservation = settled_reservation(39400);

        reservation.append_refund(record("re_1", 10000));
        assert_eq!(reservation.refunded_amount, 10000);
        assert_eq!(reservation.refund_status, RefundStatus::PartiallyRefunded);
        assert_eq!(reservation.remaining_refundable(), 29400);

        reservation.append_refund(record("re_2", 29400));
        assert_eq!(reservation.refunded_amount, 39400);
        assert_eq!(reservation.refund_status, RefundStatus::Refunded);
        assert_eq!(reservation.refund_ids, vec!["re_1", "re_2"]);
        assert_eq!(reservation.refund_history.len(), 2);
    }

    #[test]
    fn test_replace_refund_ledger() {
        let mut reservation = settled_reservation(39400);
        reservation.append_refund(record("re_local", 5000));

        reservation.replace_refund_ledger(15000, vec![record("re_a", 10000), record("re_b", 5000)]);

        assert_eq!(reservation.refunded_amount, 15000);
        assert_eq!(reservation.refund_status, RefundStatus::PartiallyRefunded);
        assert_eq!(reservation.refund_ids, vec!["re_a", "re_b"]);
        assert_eq!(reservation.refund_history.len(), 2);
    }
}
