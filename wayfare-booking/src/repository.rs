use crate::models::{Booking, BookingUpdate};
use async_trait::async_trait;
use uuid::Uuid;

/// Attempts made by [`apply_with_retry`] before giving up on a contended booking
pub const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Duplicate value for unique field {0}")]
    Duplicate(String),

    #[error("Booking {0} kept changing under concurrent writers")]
    Contention(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result of a compare-and-swap write
#[derive(Debug)]
pub enum VersionedWrite {
    Applied(Booking),
    /// The stored version no longer matches; nothing was written
    Stale,
}

/// Durable keyed store for bookings.
///
/// Every mutation goes through [`BookingRepository::update_if_version`], a
/// single-document conditional update. There are no multi-document writes.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError>;

    async fn find_by_provider_order(&self, order_id: &str) -> Result<Option<Booking>, StoreError>;

    /// PNR match is case-insensitive
    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError>;

    /// Insert a new booking. Reference, provider order id and a present PNR must be unique.
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Apply `update` only if the stored version equals `expected_version`,
    /// bumping the version on success.
    async fn update_if_version(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &BookingUpdate,
    ) -> Result<VersionedWrite, StoreError>;
}

#[derive(Debug)]
pub enum WriteResult {
    Written(Booking),
    /// `decide` asked for no change; carries the booking it looked at
    Unchanged(Booking),
}

impl WriteResult {
    pub fn into_booking(self) -> Booking {
        match self {
            WriteResult::Written(b) | WriteResult::Unchanged(b) => b,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, WriteResult::Written(_))
    }
}

/// Optimistic read-decide-write loop for one logical booking write.
///
/// `decide` sees the latest stored booking and returns the update to make, or
/// `None` for no write. A stale version reloads the booking and decides again.
pub async fn apply_with_retry<F>(
    repo: &dyn BookingRepository,
    mut current: Booking,
    mut decide: F,
) -> Result<WriteResult, StoreError>
where
    F: FnMut(&Booking) -> Option<BookingUpdate> + Send,
{
    let id = current.id;
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let update = match decide(&current) {
            Some(update) if !update.is_empty() => update,
            _ => return Ok(WriteResult::Unchanged(current)),
        };

        match repo.update_if_version(id, current.version, &update).await? {
            VersionedWrite::Applied(updated) => return Ok(WriteResult::Written(updated)),
            VersionedWrite::Stale => {
                tracing::debug!(booking_id = %id, attempt, "Stale booking version, reloading");
                current = repo
                    .get(id)
                    .await?
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            }
        }
    }

    tracing::warn!(booking_id = %id, "Giving up after {} contended writes", MAX_WRITE_ATTEMPTS);
    Err(StoreError::Contention(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_booking;
    use crate::memory::MemoryBookingRepository;
    use crate::models::BookingStatus;

    #[tokio::test]
    async fn test_retry_redecides_on_stale_version() {
        let repo = MemoryBookingRepository::new();
        let booking = sample_booking();
        repo.insert(&booking).await.unwrap();

        // Someone else writes first, so our copy is stale
        repo.update_if_version(booking.id, 0, &BookingUpdate::status(BookingStatus::Held))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let result = apply_with_retry(&repo, booking.clone(), |current| {
            seen.push(current.status);
            current
                .transition_to(BookingStatus::Issued)
                .map(BookingUpdate::status)
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![BookingStatus::Pending, BookingStatus::Held]);
        let written = result.into_booking();
        assert_eq!(written.status, BookingStatus::Issued);
        assert_eq!(written.version, 2);
    }

    #[tokio::test]
    async fn test_no_decision_means_no_write() {
        let repo = MemoryBookingRepository::new();
        let booking = sample_booking();
        repo.insert(&booking).await.unwrap();
        let writes_before = repo.write_count();

        let result = apply_with_retry(&repo, booking, |_| None).await.unwrap();

        assert!(!result.was_written());
        assert_eq!(repo.write_count(), writes_before);
    }
}
