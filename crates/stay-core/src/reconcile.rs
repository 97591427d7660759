//! # Webhook Reconciliation
//!
//! Turns the provider's at-least-once event stream into a single consistent
//! reservation record per checkout session.
//!
//! Payment-completed events create the reservation exactly once; replays
//! only fill fields that are still empty, so any number of deliveries
//! converges to the same row. Charge-refunded events never trust the event
//! payload's refund list: the authoritative refund state is read back from
//! the gateway and swapped in under compare-and-swap, so this path and the
//! operator refund path can race safely.

use crate::checkout::{listing_pricing, nights_between, BookingIntent};
use crate::error::{BookingError, BookingResult};
use crate::gateway::{
    ChargeRefunded, GatewayCharge, GatewayEvent, SessionCompleted, SharedGateway,
};
use crate::listing::{SharedListings, SharedTaxProfiles};
use crate::money::round_whole;
use crate::pricing::quote_stay;
use crate::reservation::{CardSummary, RefundRecord, RefundStatus, Reservation};
use crate::store::SharedStore;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Retries for compare-and-swap loops before surfacing the conflict to the
/// provider's redelivery mechanism
const MAX_CAS_ATTEMPTS: u32 = 3;

/// What a processed event did
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Payment-completed event settled the session
    Settled {
        reservation: Reservation,
        newly_created: bool,
    },
    /// Charge-refunded event synchronized these reservations (possibly none,
    /// when the refund raced ahead of settlement)
    RefundSynced { updated: Vec<Reservation> },
    /// Recognized but uninteresting event kind
    Ignored { event_type: String },
}

/// Reconciles verified provider events into the reservation store
pub struct WebhookReconciler {
    gateway: SharedGateway,
    store: SharedStore,
    listings: SharedListings,
    tax_profiles: SharedTaxProfiles,
}

/// Payment/card enrichment pulled from the gateway at settle time
#[derive(Debug, Default)]
struct PaymentEnrichment {
    charge_id: Option<String>,
    balance_transaction_id: Option<String>,
    card: CardSummary,
}

impl WebhookReconciler {
    pub fn new(
        gateway: SharedGateway,
        store: SharedStore,
        listings: SharedListings,
        tax_profiles: SharedTaxProfiles,
    ) -> Self {
        Self {
            gateway,
            store,
            listings,
            tax_profiles,
        }
    }

    /// Process one verified event. Any error after verification is the
    /// caller's signal to let the provider redeliver; every path here is
    /// safe to retry.
    #[instrument(skip(self, event))]
    pub async fn process(&self, event: GatewayEvent) -> BookingResult<ReconcileOutcome> {
        match event {
            GatewayEvent::SessionCompleted(data) => self.settle_session(data).await,
            GatewayEvent::ChargeRefunded(data) => self.sync_charge_refunds(data).await,
            GatewayEvent::Ignored { event_type } => Ok(ReconcileOutcome::Ignored { event_type }),
        }
    }

    /// Settle a payment-completed event: create the reservation on first
    /// delivery, merge-only-if-missing on replays.
    async fn settle_session(&self, data: SessionCompleted) -> BookingResult<ReconcileOutcome> {
        if let Some(existing) = self.store.find_by_session(&data.session_id).await? {
            let reservation = self.merge_existing(existing, &data).await?;
            return Ok(ReconcileOutcome::Settled {
                reservation,
                newly_created: false,
            });
        }

        let intent = BookingIntent::from_metadata(&data.metadata)?;

        // Authoritative pricing is re-derived from the *current* listing and
        // tax-profile state, not a checkout-time snapshot.
        let listing = self
            .listings
            .find(&intent.listing_id)
            .await?
            .ok_or_else(|| {
                BookingError::StaleBookingConstraint(format!(
                    "Listing {} no longer exists at settlement",
                    intent.listing_id
                ))
            })?;

        let nights = nights_between(intent.start_date, intent.end_date).max(0) as u32;
        if nights < listing.min_nights {
            return Err(BookingError::StaleBookingConstraint(format!(
                "Stay of {} nights is below the listing minimum of {} at settlement",
                nights, listing.min_nights
            )));
        }

        let profile = match &listing.tax_profile_id {
            Some(id) => self.tax_profiles.find(id).await?,
            None => None,
        };
        let breakdown = quote_stay(&listing_pricing(&listing, nights), profile.as_ref())?;

        let enrichment = self.enrich_payment(data.payment_intent_id.as_deref()).await;

        let reservation = Reservation {
            id: Uuid::new_v4(),
            guest_id: intent.guest_id,
            listing_id: intent.listing_id,
            start_date: intent.start_date,
            end_date: intent.end_date,
            nights,
            guests: intent.guests,
            nightly_rate: round_whole(listing.nightly_rate),
            nightly_subtotal: breakdown.nightly_subtotal,
            cleaning_fee: breakdown.cleaning_subtotal,
            service_fee: breakdown.service_subtotal,
            subtotal: breakdown.subtotal,
            tax_rate: breakdown.effective_tax_rate(),
            tax_amount: breakdown.tax_total,
            total_price: breakdown.total,
            checkout_session_id: data.session_id.clone(),
            payment_intent_id: data.payment_intent_id.clone(),
            charge_id: enrichment.charge_id,
            balance_transaction_id: enrichment.balance_transaction_id,
            payment_status: data.payment_status.clone(),
            currency: data.currency,
            amount_paid: data.amount_total,
            card: enrichment.card,
            refunded_amount: 0,
            refund_status: RefundStatus::None,
            refund_ids: Vec::new(),
            refund_history: Vec::new(),
            version: 0,
            created_at: Utc::now(),
        };

        match self.store.insert(reservation).await {
            Ok(created) => {
                info!(
                    session_id = %data.session_id,
                    reservation_id = %created.id,
                    amount_paid = created.amount_paid,
                    "Settled checkout session"
                );
                Ok(ReconcileOutcome::Settled {
                    reservation: created,
                    newly_created: true,
                })
            }
            // Lost the insert race to a concurrent delivery; fall back to
            // the merge path against the winner's row.
            Err(BookingError::DuplicateSession { .. }) => {
                let existing = self
                    .store
                    .find_by_session(&data.session_id)
                    .await?
                    .ok_or_else(|| {
                        BookingError::Internal(format!(
                            "Reservation for session {} vanished after insert conflict",
                            data.session_id
                        ))
                    })?;
                let reservation = self.merge_existing(existing, &data).await?;
                Ok(ReconcileOutcome::Settled {
                    reservation,
                    newly_created: false,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Duplicate delivery: fill currently-empty payment/card fields, never
    /// overwrite populated ones, never create a second row.
    async fn merge_existing(
        &self,
        mut existing: Reservation,
        data: &SessionCompleted,
    ) -> BookingResult<Reservation> {
        for attempt in 0..MAX_CAS_ATTEMPTS {
            let mut merged = existing.clone();
            self.merge_missing_fields(&mut merged, data).await;

            if merged.payment_intent_id == existing.payment_intent_id
                && merged.charge_id == existing.charge_id
                && merged.balance_transaction_id == existing.balance_transaction_id
                && merged.card == existing.card
                && merged.payment_status == existing.payment_status
                && merged.amount_paid == existing.amount_paid
            {
                // Nothing to fill; replay converged without a write
                return Ok(existing);
            }

            match self.store.update(merged).await {
                Ok(updated) => return Ok(updated),
                Err(BookingError::WriteConflict { .. }) if attempt + 1 < MAX_CAS_ATTEMPTS => {
                    existing = self
                        .store
                        .find_by_session(&data.session_id)
                        .await?
                        .ok_or_else(|| {
                            BookingError::Internal(format!(
                                "Reservation for session {} vanished during merge",
                                data.session_id
                            ))
                        })?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(BookingError::WriteConflict {
            id: existing.id.to_string(),
        })
    }

    async fn merge_missing_fields(&self, reservation: &mut Reservation, data: &SessionCompleted) {
        if reservation.payment_intent_id.is_none() {
            reservation.payment_intent_id = data.payment_intent_id.clone();
        }
        if reservation.payment_status.is_empty() {
            reservation.payment_status = data.payment_status.clone();
        }
        if reservation.amount_paid == 0 {
            reservation.amount_paid = data.amount_total;
        }

        if reservation.charge_id.is_none() || reservation.card.is_empty() {
            let enrichment = self
                .enrich_payment(reservation.payment_intent_id.as_deref())
                .await;
            if reservation.charge_id.is_none() {
                reservation.charge_id = enrichment.charge_id;
            }
            if reservation.balance_transaction_id.is_none() {
                reservation.balance_transaction_id = enrichment.balance_transaction_id;
            }
            if reservation.card.is_empty() {
                reservation.card = enrichment.card;
            }
        }
    }

    /// Best-effort payment/card enrichment; a gateway hiccup here never
    /// fails settlement, the next replay fills the gaps.
    async fn enrich_payment(&self, payment_intent_id: Option<&str>) -> PaymentEnrichment {
        let Some(intent_id) = payment_intent_id else {
            return PaymentEnrichment::default();
        };

        let charge_id = match self.gateway.retrieve_payment_intent(intent_id).await {
            Ok(intent) => intent.latest_charge_id,
            Err(err) => {
                warn!(intent_id, %err, "Payment intent lookup failed during settlement");
                return PaymentEnrichment::default();
            }
        };
        let Some(charge_id) = charge_id else {
            return PaymentEnrichment::default();
        };

        match self.gateway.retrieve_charge(&charge_id).await {
            Ok(charge) => PaymentEnrichment {
                charge_id: Some(charge.id),
                balance_transaction_id: charge.balance_transaction_id,
                card: CardSummary {
                    brand: charge.card.brand,
                    last4: charge.card.last4,
                    exp_month: charge.card.exp_month,
                    exp_year: charge.card.exp_year,
                },
            },
            Err(err) => {
                warn!(charge_id, %err, "Charge lookup failed during settlement");
                PaymentEnrichment {
                    charge_id: Some(charge_id),
                    ..PaymentEnrichment::default()
                }
            }
        }
    }

    /// Apply a charge-refunded event from the gateway's canonical state.
    async fn sync_charge_refunds(&self, data: ChargeRefunded) -> BookingResult<ReconcileOutcome> {
        let charge = self.gateway.retrieve_charge(&data.charge_id).await?;

        let reservations = self.store.find_by_charge(&data.charge_id).await?;
        if reservations.is_empty() {
            // Refund event raced ahead of settlement; nothing to update yet
            warn!(charge_id = %data.charge_id, "Charge-refunded event with no reservation");
            return Ok(ReconcileOutcome::RefundSynced {
                updated: Vec::new(),
            });
        }

        let mut updated = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            updated.push(self.replace_ledger_cas(reservation, &charge).await?);
        }

        info!(
            charge_id = %data.charge_id,
            amount_refunded = charge.amount_refunded,
            "Synchronized refund ledger from gateway"
        );
        Ok(ReconcileOutcome::RefundSynced { updated })
    }

    async fn replace_ledger_cas(
        &self,
        mut reservation: Reservation,
        charge: &GatewayCharge,
    ) -> BookingResult<Reservation> {
        let records: Vec<RefundRecord> = charge.refunds.iter().map(RefundRecord::from_gateway).collect();

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let mut next = reservation.clone();
            next.replace_refund_ledger(charge.amount_refunded, records.clone());

            match self.store.update(next).await {
                Ok(updated) => return Ok(updated),
                Err(BookingError::WriteConflict { .. }) if attempt + 1 < MAX_CAS_ATTEMPTS => {
                    reservation = self
                        .store
                        .get(reservation.id)
                        .await?
                        .ok_or(BookingError::NotFound {
                            entity: "reservation",
                            id: reservation.id.to_string(),
                        })?;
                }
                Err(err) => return Err(err),
            }
        }
        Err(BookingError::WriteConflict {
            id: reservation.id.to_string(),
        })
    }
}
