use crate::models::{Booking, BookingStatus, Passenger, Segment};
use crate::repository::{BookingRepository, StoreError};
use crate::sync::SmartSync;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Covers both an unknown PNR and an email that does not match it
    #[error("Booking not found")]
    NotFound,

    #[error("Invalid lookup: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Customer-safe projection of a booking. No internal ids, contact details or
/// payment references.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicBookingView {
    pub reference: String,
    pub pnr: Option<String>,
    pub status: BookingStatus,
    pub paid: bool,
    pub payment_deadline: Option<DateTime<Utc>>,
    pub segments: Vec<Segment>,
    pub passengers: Vec<Passenger>,
    pub document_urls: Vec<String>,
    pub can_request_refund: bool,
    pub can_request_change: bool,
    pub schedule_change_pending: bool,
}

impl PublicBookingView {
    pub fn project(booking: &Booking) -> Self {
        let issued = booking.status == BookingStatus::Issued;
        Self {
            reference: booking.reference.clone(),
            pnr: booking.pnr.clone(),
            status: booking.status,
            paid: booking.payment_status.is_settled(),
            payment_deadline: booking
                .payment_deadline
                .filter(|_| booking.status.awaits_payment()),
            segments: booking.itinerary.segments.clone(),
            passengers: booking.itinerary.passengers.clone(),
            document_urls: booking.documents.iter().filter_map(|d| d.url.clone()).collect(),
            can_request_refund: issued
                && booking.itinerary.conditions.refundable
                && booking.cancellation.is_none(),
            can_request_change: issued && booking.itinerary.conditions.changeable,
            schedule_change_pending: booking.requires_review && booking.airline_change.is_some(),
        }
    }
}

/// Unauthenticated status lookup by PNR and contact email
pub struct StatusLookup {
    repo: Arc<dyn BookingRepository>,
    sync: Arc<SmartSync>,
}

impl StatusLookup {
    pub fn new(repo: Arc<dyn BookingRepository>, sync: Arc<SmartSync>) -> Self {
        Self { repo, sync }
    }

    pub async fn lookup(&self, pnr: &str, email: &str) -> Result<PublicBookingView, LookupError> {
        let pnr = pnr.trim().to_ascii_uppercase();
        let email = email.trim();
        if pnr.is_empty() || email.is_empty() {
            return Err(LookupError::InvalidQuery(
                "pnr and email are both required".to_string(),
            ));
        }

        let booking = match self.repo.find_by_pnr(&pnr).await? {
            Some(booking) if booking.contact.email_matches(email) => booking,
            _ => {
                debug!(pnr = %pnr, "Status lookup did not match a booking");
                return Err(LookupError::NotFound);
            }
        };

        let fresh = self.sync.reconcile(booking.clone()).await.unwrap_or(booking);
        Ok(PublicBookingView::project(&fresh))
    }
}
