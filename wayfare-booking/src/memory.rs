use crate::models::{Booking, BookingUpdate};
use crate::repository::{BookingRepository, StoreError, VersionedWrite};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory booking store for sandbox mode and tests
#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    writes: AtomicUsize,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful inserts and updates
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Replace a stored booking verbatim, bypassing versioning (test setup only)
    pub async fn overwrite(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id, booking);
    }

    fn check_unique(
        bookings: &HashMap<Uuid, Booking>,
        candidate: &Booking,
    ) -> Result<(), StoreError> {
        for other in bookings.values().filter(|b| b.id != candidate.id) {
            if other.reference == candidate.reference {
                return Err(StoreError::Duplicate("reference".to_string()));
            }
            if candidate.provider_order_id.is_some()
                && other.provider_order_id == candidate.provider_order_id
            {
                return Err(StoreError::Duplicate("provider_order_id".to_string()));
            }
            if let (Some(a), Some(b)) = (&candidate.pnr, &other.pnr) {
                if a.eq_ignore_ascii_case(b) {
                    return Err(StoreError::Duplicate("pnr".to_string()));
                }
            }
        }
        Ok(())
    }

    async fn find_by<P>(&self, predicate: P) -> Option<Booking>
    where
        P: Fn(&Booking) -> bool,
    {
        self.bookings
            .read()
            .await
            .values()
            .find(|b| predicate(b))
            .cloned()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.find_by(|b| b.reference == reference).await)
    }

    async fn find_by_provider_order(&self, order_id: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .find_by(|b| b.provider_order_id.as_deref() == Some(order_id))
            .await)
    }

    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .find_by(|b| b.pnr.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(pnr)))
            .await)
    }

    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate("id".to_string()));
        }
        Self::check_unique(&bookings, booking)?;
        bookings.insert(booking.id, booking.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_if_version(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &BookingUpdate,
    ) -> Result<VersionedWrite, StoreError> {
        let mut bookings = self.bookings.write().await;
        let stored = bookings
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if stored.version != expected_version {
            return Ok(VersionedWrite::Stale);
        }

        let mut next = stored.clone();
        next.apply(update, Utc::now());
        next.version = expected_version + 1;
        Self::check_unique(&bookings, &next)?;

        bookings.insert(id, next.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(VersionedWrite::Applied(next))
    }
}
