use crate::models::BookingStatus;
use chrono::{DateTime, Utc};
use wayfare_core::gateway::ProviderOrder;

/// What the provider's order says the booking should look like
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedState {
    pub status: BookingStatus,
    /// Candidate PNR
    pub booking_reference: Option<String>,
    pub payment_deadline: Option<DateTime<Utc>>,
}

/// Map a provider order to exactly one booking status.
///
/// First match wins: cancellation dominates issued documents, and issued
/// documents dominate a bare payment. An order showing none of the signals is
/// `failed`, never silently `pending`.
pub fn derive_status(order: &ProviderOrder) -> DerivedState {
    let status = if order.cancelled_at.is_some() {
        BookingStatus::Cancelled
    } else if !order.documents.is_empty() {
        BookingStatus::Issued
    } else if order.payment_status.paid_at.is_some() {
        BookingStatus::Issued
    } else if order.payment_status.payment_required_by.is_some() {
        BookingStatus::Held
    } else {
        BookingStatus::Failed
    };

    DerivedState {
        status,
        booking_reference: order
            .booking_reference
            .as_ref()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        payment_deadline: order.payment_status.payment_required_by,
    }
}
