use crate::derivation::{derive_status, DerivedState};
use crate::models::{enforce_deadline, Booking, BookingUpdate};
use crate::repository::{apply_with_retry, BookingRepository, WriteResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wayfare_core::gateway::{GatewayError, OrderGateway, ProviderOrder};

/// Default bound on a reconciliation fetch
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(1500);

/// What to reconcile: a booking id, or a booking the caller already loaded
#[derive(Debug, Clone)]
pub enum SyncTarget {
    Id(Uuid),
    Loaded(Booking),
}

impl From<Uuid> for SyncTarget {
    fn from(id: Uuid) -> Self {
        SyncTarget::Id(id)
    }
}

impl From<Booking> for SyncTarget {
    fn from(booking: Booking) -> Self {
        SyncTarget::Loaded(booking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated,
    Unchanged,
    NoProviderOrder,
    Terminal,
    FetchFailed,
    WriteFailed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::NoProviderOrder => "no_provider_order",
            SyncOutcome::Terminal => "terminal",
            SyncOutcome::FetchFailed => "fetch_failed",
            SyncOutcome::WriteFailed => "write_failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub booking: Booking,
    pub outcome: SyncOutcome,
}

/// On-demand reconciliation of a booking against the provider's order.
///
/// Never returns an error: any failure yields the booking as it was loaded.
/// Sends no notifications.
pub struct SmartSync {
    gateway: Arc<dyn OrderGateway>,
    repo: Arc<dyn BookingRepository>,
    timeout: Duration,
}

impl SmartSync {
    pub fn new(gateway: Arc<dyn OrderGateway>, repo: Arc<dyn BookingRepository>) -> Self {
        Self {
            gateway,
            repo,
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refresh a booking and return its current state. `None` only when an id
    /// does not resolve to a booking.
    pub async fn reconcile(&self, target: impl Into<SyncTarget>) -> Option<Booking> {
        self.reconcile_with_report(target).await.map(|r| r.booking)
    }

    pub async fn reconcile_with_report(&self, target: impl Into<SyncTarget>) -> Option<SyncReport> {
        let booking = match target.into() {
            SyncTarget::Loaded(booking) => booking,
            SyncTarget::Id(id) => match self.repo.get(id).await {
                Ok(Some(booking)) => booking,
                Ok(None) => {
                    debug!(booking_id = %id, "Nothing to sync, booking not found");
                    return None;
                }
                Err(e) => {
                    warn!(booking_id = %id, "Failed to load booking for sync: {}", e);
                    return None;
                }
            },
        };

        Some(self.run(booking).await)
    }

    async fn run(&self, booking: Booking) -> SyncReport {
        let Some(order_id) = booking.provider_order_id.clone() else {
            return SyncReport { booking, outcome: SyncOutcome::NoProviderOrder };
        };

        if booking.status.is_terminal() {
            debug!(booking_id = %booking.id, status = %booking.status, "Skipping sync of terminal booking");
            return SyncReport { booking, outcome: SyncOutcome::Terminal };
        }

        let order = match fetch_order(self.gateway.as_ref(), &order_id, self.timeout).await {
            Ok(order) => order,
            Err(e) => {
                warn!(booking_id = %booking.id, order_id = %order_id, "Sync fetch failed, serving stored booking: {}", e);
                return SyncReport { booking, outcome: SyncOutcome::FetchFailed };
            }
        };

        let derived = derive_status(&order);
        let now = Utc::now();
        let result = apply_with_retry(self.repo.as_ref(), booking.clone(), |current| {
            if current.status.is_terminal() {
                return None;
            }
            reconcile_update(current, &derived, now)
        })
        .await;

        match result {
            Ok(WriteResult::Written(updated)) => {
                info!(
                    booking_id = %updated.id,
                    from = %booking.status,
                    to = %updated.status,
                    "Booking reconciled with provider"
                );
                SyncReport { booking: updated, outcome: SyncOutcome::Updated }
            }
            Ok(WriteResult::Unchanged(current)) => SyncReport {
                booking: current,
                outcome: SyncOutcome::Unchanged,
            },
            Err(e) => {
                warn!(booking_id = %booking.id, "Sync write failed, serving stored booking: {}", e);
                SyncReport { booking, outcome: SyncOutcome::WriteFailed }
            }
        }
    }
}

/// Fetch an order with a hard upper bound; a timeout is a fetch failure.
pub async fn fetch_order(
    gateway: &dyn OrderGateway,
    order_id: &str,
    timeout: Duration,
) -> Result<ProviderOrder, GatewayError> {
    match tokio::time::timeout(timeout, gateway.get_order(order_id)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout),
    }
}

/// Decide the single write reconciliation should make, if any.
///
/// A write happens only when the status or the PNR changed; the deadline and
/// sync timestamp ride along with it. A stored deadline is only replaced by a
/// later one, though an earlier provider deadline still drives expiry.
pub fn reconcile_update(
    booking: &Booking,
    derived: &DerivedState,
    now: DateTime<Utc>,
) -> Option<BookingUpdate> {
    let deadline = derived.payment_deadline.or(booking.payment_deadline);
    let target = enforce_deadline(derived.status, deadline, now);

    let status = if target != booking.status {
        booking.transition_to(target)
    } else {
        None
    };

    let pnr = derived
        .booking_reference
        .as_ref()
        .filter(|candidate| booking.pnr.as_deref() != Some(candidate.as_str()))
        .cloned();

    if status.is_none() && pnr.is_none() {
        return None;
    }

    Some(BookingUpdate {
        status,
        pnr,
        payment_deadline: derived
            .payment_deadline
            .filter(|d| booking.payment_deadline.map_or(true, |stored| *d > stored)),
        last_synced_at: Some(now),
        ..Default::default()
    })
}
