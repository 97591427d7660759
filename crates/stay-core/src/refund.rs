//! # Operator Refunds
//!
//! Operator-triggered refunds against a settled reservation. A refund is
//! validated against the refundable remainder, executed at the gateway, and
//! appended to the reservation's refund ledger.
//!
//! Once the gateway call succeeds, money has moved; if the local persist
//! step then fails or loses a compare-and-swap race with webhook
//! reconciliation, the coordinator re-queries the gateway for the charge's
//! canonical refund state and reconciles from that instead of guessing.

use crate::error::{BookingError, BookingResult};
use crate::gateway::SharedGateway;
use crate::reservation::{RefundRecord, Reservation};
use crate::store::SharedStore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MAX_CAS_ATTEMPTS: u32 = 3;

/// Result of an operator refund request
#[derive(Debug)]
pub struct RefundOutcome {
    /// The reservation after persisting the refund
    pub reservation: Reservation,
    /// The ledger entry for the refund just executed
    pub refund: RefundRecord,
}

/// Coordinates operator refunds between the gateway and the store
pub struct RefundCoordinator {
    gateway: SharedGateway,
    store: SharedStore,
}

impl RefundCoordinator {
    pub fn new(gateway: SharedGateway, store: SharedStore) -> Self {
        Self { gateway, store }
    }

    /// Refund `amount` minor units against the reservation's payment
    /// intent, or the full refundable remainder when `amount` is `None`.
    ///
    /// Requests exceeding the remainder are rejected with `OverRefund`
    /// rather than clamped, so the operator sees the anomaly.
    #[instrument(skip(self), fields(reservation_id = %reservation_id))]
    pub async fn request_refund(
        &self,
        reservation_id: Uuid,
        amount: Option<i64>,
    ) -> BookingResult<RefundOutcome> {
        let reservation =
            self.store
                .get(reservation_id)
                .await?
                .ok_or(BookingError::NotFound {
                    entity: "reservation",
                    id: reservation_id.to_string(),
                })?;

        let intent_id = reservation.payment_intent_id.clone().ok_or_else(|| {
            BookingError::Validation(
                "Reservation has no payment to refund against".to_string(),
            )
        })?;

        let remaining = reservation.remaining_refundable();
        let requested = amount.unwrap_or(remaining);
        if requested <= 0 || requested > remaining {
            return Err(BookingError::OverRefund {
                requested,
                remaining,
            });
        }

        let refund = self
            .gateway
            .create_refund(&intent_id, requested, None)
            .await?;
        let record = RefundRecord::from_gateway(&refund);

        info!(
            refund_id = %record.id,
            amount = record.amount,
            "Gateway refund executed"
        );

        let mut next = reservation.clone();
        next.append_refund(record.clone());

        match self.store.update(next).await {
            Ok(updated) => Ok(RefundOutcome {
                reservation: updated,
                refund: record,
            }),
            Err(err) => {
                // The refund is already live at the provider; converge the
                // ledger from the gateway's canonical state instead of
                // dropping the update.
                warn!(%err, "Refund persisted at gateway but local write failed; reconciling");
                let reconciled = self.reconcile_from_gateway(&reservation, &intent_id).await?;
                Ok(RefundOutcome {
                    reservation: reconciled,
                    refund: record,
                })
            }
        }
    }

    /// Rebuild the reservation's refund ledger from the charge's canonical
    /// refund list, under compare-and-swap.
    async fn reconcile_from_gateway(
        &self,
        reservation: &Reservation,
        intent_id: &str,
    ) -> BookingResult<Reservation> {
        let charge_id = match &reservation.charge_id {
            Some(id) => id.clone(),
            None => self
                .gateway
                .retrieve_payment_intent(intent_id)
                .await?
                .latest_charge_id
                .ok_or_else(|| BookingError::Gateway {
                    provider: self.gateway.provider_name().to_string(),
                    message: format!("Payment intent {intent_id} has no charge"),
                })?,
        };
        let charge = self.gateway.retrieve_charge(&charge_id).await?;
        let records: Vec<RefundRecord> =
            charge.refunds.iter().map(RefundRecord::from_gateway).collect();

        let mut current = self
            .store
            .get(reservation.id)
            .await?
            .ok_or(BookingError::NotFound {
                entity: "reservation",
                id: reservation.id.to_string(),
            })?;

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let mut next = current.clone();
            next.replace_refund_ledger(charge.amount_refunded, records.clone());

            match self.store.update(next).await {
                Ok(updated) => return Ok(updated),
                Err(BookingError::WriteConflict { .. }) if attempt + 1 < MAX_CAS_ATTEMPTS => {
                    current = self
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::RefundStatus;
    use crate::store::{MemoryReservationStore, ReservationStore};
    use crate::test_support::{gateway_refund, settled_reservation, visa_charge, MockGateway};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    async fn seeded(
        amount_paid: i64,
    ) -> (Arc<MockGateway>, Arc<MemoryReservationStore>, Uuid) {
        let store = Arc::new(MemoryReservationStore::new());
        let inserted = store
            .insert(settled_reservation("cs_123", amount_paid))
            .await
            .unwrap();
        (Arc::new(MockGateway::new()), store, inserted.id)
    }

    #[tokio::test]
    async fn test_partial_then_remainder_refund_sequence() {
        let (gateway, store, id) = seeded(39400).await;
        gateway.queue_refund(Ok(gateway_refund("re_1", 10000)));
        gateway.queue_refund(Ok(gateway_refund("re_2", 29400)));
        let coordinator = RefundCoordinator::new(gateway.clone(), store.clone());

        let first = coordinator.request_refund(id, Some(10000)).await.unwrap();
        assert_eq!(first.reservation.refunded_amount, 10000);
        assert_eq!(first.reservation.refund_status, RefundStatus::PartiallyRefunded);

        // Unspecified amount refunds the remainder
        let second = coordinator.request_refund(id, None).await.unwrap();
        assert_eq!(second.reservation.refunded_amount, 39400);
        assert_eq!(second.reservation.refund_status, RefundStatus::Refunded);
        assert_eq!(second.reservation.refund_ids, vec!["re_1", "re_2"]);

        let calls = gateway.refund_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("pi_123".to_string(), 10000), ("pi_123".to_string(), 29400)]);
    }

    #[tokio::test]
    async fn test_over_refund_is_rejected_not_clamped() {
        let (gateway, store, id) = seeded(39400).await;
        let coordinator = RefundCoordinator::new(gateway.clone(), store);

        let err = coordinator.request_refund(id, Some(50000)).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::OverRefund {
                requested: 50000,
                remaining: 39400
            }
        ));
        assert!(gateway.refund_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_refundable_is_rejected() {
        let (gateway, store, id) = seeded(39400).await;
        gateway.queue_refund(Ok(gateway_refund("re_full", 39400)));
        let coordinator = RefundCoordinator::new(gateway, store);

        coordinator.request_refund(id, None).await.unwrap();
        let err = coordinator.request_refund(id, None).await.unwrap_err();
        assert!(matches!(err, BookingError::OverRefund { remaining: 0, .. }));
    }

    #[tokio::test]
    async fn test_missing_reservation() {
        let (gateway, store, _) = seeded(39400).await;
        let coordinator = RefundCoordinator::new(gateway, store);

        let err = coordinator
            .request_refund(Uuid::new_v4(), Some(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_payment_intent() {
        let store = Arc::new(MemoryReservationStore::new());
        let mut reservation = settled_reservation("cs_123", 39400);
        reservation.payment_intent_id = None;
        let inserted = store.insert(reservation).await.unwrap();
        let coordinator = RefundCoordinator::new(Arc::new(MockGateway::new()), store);

        let err = coordinator
            .request_refund(inserted.id, Some(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }

    /// Store that loses the first update, as if webhook reconciliation won
    /// the race, then behaves normally.
    struct FirstWriteLosesStore {
        inner: Arc<MemoryReservationStore>,
        tripped: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ReservationStore for FirstWriteLosesStore {
        async fn insert(&self, reservation: Reservation) -> BookingResult<Reservation> {
            self.inner.insert(reservation).await
        }
        async fn get(&self, id: Uuid) -> BookingResult<Option<Reservation>> {
            self.inner.get(id).await
        }
        async fn find_by_session(
            &self,
            session_id: &str,
        ) -> BookingResult<Option<Reservation>> {
            self.inner.find_by_session(session_id).await
        }
        async fn find_by_charge(&self, charge_id: &str) -> BookingResult<Vec<Reservation>> {
            self.inner.find_by_charge(charge_id).await
        }
        async fn update(&self, reservation: Reservation) -> BookingResult<Reservation> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(BookingError::WriteConflict {
                    id: reservation.id.to_string(),
                });
            }
            self.inner.update(reservation).await
        }
        async fn list(&self) -> BookingResult<Vec<Reservation>> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_lost_write_reconciles_from_gateway_read_back() {
        let inner = Arc::new(MemoryReservationStore::new());
        let inserted = inner
            .insert(settled_reservation("cs_123", 39400))
            .await
            .unwrap();
        let store = Arc::new(FirstWriteLosesStore {
            inner: inner.clone(),
            tripped: AtomicBool::new(false),
        });

        let gateway = Arc::new(MockGateway::new());
        gateway.queue_refund(Ok(gateway_refund("re_1", 10000)));
        // Canonical state at the provider after the refund
        let mut charge = visa_charge("ch_123", 39400);
        charge.amount_refunded = 10000;
        charge.refunds = vec![gateway_refund("re_1", 10000)];
        gateway.put_charge(charge);

        let coordinator = RefundCoordinator::new(gateway, store);
        let outcome = coordinator
            .request_refund(inserted.id, Some(10000))
            .await
            .unwrap();

        assert_eq!(outcome.reservation.refunded_amount, 10000);
        assert_eq!(outcome.reservation.refund_ids, vec!["re_1"]);

        let row = inner.get(inserted.id).await.unwrap().unwrap();
        assert_eq!(row.refunded_amount, 10000);
        assert_eq!(row.refund_status, RefundStatus::PartiallyRefunded);
    }
}
