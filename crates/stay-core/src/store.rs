//! # Reservation Store
//!
//! Persistence seam for reservation rows. All cross-component coordination
//! happens through these rows: webhook reconciliation and operator refunds
//! race on the same record, so every write goes through compare-and-swap on
//! the reservation's `version` and inserts are unique per checkout-session
//! id (the idempotency key).

use crate::error::{BookingError, BookingResult};
use crate::reservation::Reservation;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence operations the booking core needs from the shared store
#[async_trait::async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert a new reservation. Fails with `DuplicateSession` if a row for
    /// the same checkout-session id already exists; the returned row has
    /// `version` 1.
    async fn insert(&self, reservation: Reservation) -> BookingResult<Reservation>;

    async fn get(&self, id: Uuid) -> BookingResult<Option<Reservation>>;

    async fn find_by_session(&self, session_id: &str) -> BookingResult<Option<Reservation>>;

    /// Expected cardinality: one. Returned as a list because the store
    /// cannot enforce that.
    async fn find_by_charge(&self, charge_id: &str) -> BookingResult<Vec<Reservation>>;

    /// Compare-and-swap update: succeeds only when `reservation.version`
    /// matches the stored row, bumping the version; fails with
    /// `WriteConflict` otherwise.
    async fn update(&self, reservation: Reservation) -> BookingResult<Reservation>;

    /// All reservations, newest first (dashboard/trip reads)
    async fn list(&self) -> BookingResult<Vec<Reservation>>;
}

pub type SharedStore = Arc<dyn ReservationStore>;

/// In-memory reservation store for composition and tests
#[derive(Default)]
pub struct MemoryReservationStore {
    rows: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn insert(&self, mut reservation: Reservation) -> BookingResult<Reservation> {
        let mut rows = self.rows.write().await;
        if rows
            .values()
            .any(|r| r.checkout_session_id == reservation.checkout_session_id)
        {
            return Err(BookingError::DuplicateSession {
                session_id: reservation.checkout_session_id,
            });
        }
        reservation.version = 1;
        rows.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: Uuid) -> BookingResult<Option<Reservation>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> BookingResult<Option<Reservation>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|r| r.checkout_session_id == session_id)
            .cloned())
    }

    async fn find_by_charge(&self, charge_id: &str) -> BookingResult<Vec<Reservation>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.charge_id.as_deref() == Some(charge_id))
            .cloned()
            .collect())
    }

    async fn update(&self, mut reservation: Reservation) -> BookingResult<Reservation> {
        let mut rows = self.rows.write().await;
        let current = rows.get(&reservation.id).ok_or(BookingError::NotFound {
            entity: "reservation",
            id: reservation.id.to_string(),
        })?;
        if current.version != reservation.version {
            return Err(BookingError::WriteConflict {
                id: reservation.id.to_string(),
            });
        }
        reservation.version += 1;
        rows.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn list(&self) -> BookingResult<Vec<Reservation>> {
        let mut all: Vec<Reservation> = self.rows.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::settled_reservation;

    #[tokio::test]
    async fn test_insert_is_unique_per_session() {
        let store = MemoryReservationStore::new();
        let first = settled_reservation("cs_123", 39400);
        let mut second = settled_reservation("cs_123", 39400);
        second.id = Uuid::new_v4();

        store.insert(first).await.unwrap();
        let err = store.insert(second).await.unwrap_err();
        assert!(matches!(err, BookingError::DuplicateSession { .. }));
    }

    #[tokio::test]
    async fn test_update_requires_matching_version() {
        let store = MemoryReservationStore::new();
        let inserted = store
            .insert(settled_reservation("cs_123", 39400))
            .await
            .unwrap();
        assert_eq!(inserted.version, 1);

        // Writer A updates first
        let mut a = inserted.clone();
        a.payment_status = "paid".to_string();
        let updated = store.update(a).await.unwrap();
        assert_eq!(updated.version, 2);

        // Writer B still holds version 1 and must lose
        let mut b = inserted;
        b.refunded_amount = 100;
        let err = store.update(b).await.unwrap_err();
        assert!(matches!(err, BookingError::WriteConflict { .. }));
    }

    #[tokio::test]
    async fn test_find_by_charge() {
        let store = MemoryReservationStore::new();
        let mut reservation = settled_reservation("cs_123", 39400);
        reservation.charge_id = Some("ch_abc".to_string());
        store.insert(reservation).await.unwrap();

        assert_eq!(store.find_by_charge("ch_abc").await.unwrap().len(), 1);
        assert!(store.find_by_charge("ch_zzz").await.unwrap().is_empty());
    }
}
