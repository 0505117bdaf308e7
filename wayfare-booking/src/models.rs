use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use wayfare_core::gateway::{ProviderDocument, ProviderOrder};
use wayfare_core::money;
use wayfare_core::CoreResult;
use wayfare_shared::Masked;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Held,
    Issued,
    Failed,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Held => "held",
            BookingStatus::Issued => "issued",
            BookingStatus::Failed => "failed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Expired => "expired",
        }
    }

    /// Failed and cancelled bookings are never re-derived from the provider
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Failed | BookingStatus::Cancelled)
    }

    /// Statuses that can still be waiting on a payment deadline
    pub fn awaits_payment(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Held)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    /// Staying in the same status is not a transition and returns false.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (a, b) if *a == b => false,
            (Pending, _) => true,
            (Held, Issued | Failed | Cancelled | Expired) => true,
            (Issued, Cancelled) => true,
            (Expired, Issued | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "held" => Ok(BookingStatus::Held),
            "issued" => Ok(BookingStatus::Issued),
            "failed" => Ok(BookingStatus::Failed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "expired" => Ok(BookingStatus::Expired),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// Customer payment axis, tracked independently of the booking status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Authorized,
    Captured,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Money has moved (or moved back); no new charge may be opened
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Authorized | PaymentStatus::Captured | PaymentStatus::Refunded
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub email: Masked<String>,
    pub phone: Option<Masked<String>>,
}

impl ContactInfo {
    /// Case-insensitive, whitespace-tolerant email comparison
    pub fn email_matches(&self, candidate: &str) -> bool {
        self.email.expose().trim().to_lowercase() == candidate.trim().to_lowercase()
    }
}

/// Prices captured when the booking was placed; never recalculated afterwards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingSnapshot {
    pub base_fare: f64,
    pub markup: f64,
    pub total_amount: f64,
    pub currency: String,
}

impl PricingSnapshot {
    pub fn minor_units(&self) -> CoreResult<i64> {
        money::to_minor_units(self.total_amount, &self.currency)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Itinerary {
    pub segments: Vec<Segment>,
    pub passengers: Vec<Passenger>,
    pub conditions: FareConditions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub origin: String,
    pub destination: String,
    pub departing_at: String,
    pub arriving_at: String,
    pub carrier: String,
    pub flight_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passenger {
    pub given_name: String,
    pub family_name: String,
    pub passenger_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FareConditions {
    pub refundable: bool,
    pub changeable: bool,
}

impl Itinerary {
    pub fn from_order(order: &ProviderOrder) -> Self {
        let segments = order
            .slices
            .iter()
            .flat_map(|slice| slice.segments.iter())
            .map(|s| Segment {
                origin: s.origin.clone(),
                destination: s.destination.clone(),
                departing_at: s.departing_at.clone(),
                arriving_at: s.arriving_at.clone(),
                carrier: s.marketing_carrier.clone(),
                flight_number: s.flight_number.clone(),
            })
            .collect();

        let passengers = order
            .passengers
            .iter()
            .map(|p| Passenger {
                given_name: p.given_name.clone(),
                family_name: p.family_name.clone(),
                passenger_type: p.passenger_type.clone(),
            })
            .collect();

        Self {
            segments,
            passengers,
            conditions: FareConditions {
                refundable: order.conditions.refundable,
                changeable: order.conditions.changeable,
            },
        }
    }
}

/// An issued ticket or boarding document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketDocument {
    pub id: Option<String>,
    pub document_type: String,
    pub url: Option<String>,
}

impl From<&ProviderDocument> for TicketDocument {
    fn from(doc: &ProviderDocument) -> Self {
        Self {
            id: doc.unique_identifier.clone(),
            document_type: doc.document_type.clone(),
            url: doc.url.clone(),
        }
    }
}

/// Raw schedule change or cancellation pushed by the airline, kept for human review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirlineChange {
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CancellationRecord {
    pub confirmed_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<String>,
    pub refund_currency: Option<String>,
    pub refund_to: Option<String>,
}

/// The local record of one flight purchase attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub provider_order_id: Option<String>,
    pub pnr: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_deadline: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub contact: ContactInfo,
    pub pricing: PricingSnapshot,
    pub itinerary: Itinerary,
    pub documents: Vec<TicketDocument>,
    pub airline_change: Option<AirlineChange>,
    pub cancellation: Option<CancellationRecord>,
    pub admin_notes: Option<String>,
    pub requires_review: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(contact: ContactInfo, pricing: PricingSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference: generate_reference(),
            provider_order_id: None,
            pnr: None,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_deadline: None,
            payment_intent_id: None,
            contact,
            pricing,
            itinerary: Itinerary::default(),
            documents: Vec::new(),
            airline_change: None,
            cancellation: None,
            admin_notes: None,
            requires_review: false,
            last_synced_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The target status if moving there is legal, `None` otherwise
    pub fn transition_to(&self, target: BookingStatus) -> Option<BookingStatus> {
        if self.status.can_transition_to(target) {
            Some(target)
        } else {
            if self.status != target {
                tracing::warn!(
                    booking_id = %self.id,
                    from = %self.status,
                    to = %target,
                    "Refusing illegal booking status transition"
                );
            }
            None
        }
    }

    /// Apply a field-level update. The repository owns `version`.
    pub fn apply(&mut self, update: &BookingUpdate, now: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(payment_status) = update.payment_status {
            self.payment_status = payment_status;
        }
        if let Some(pnr) = &update.pnr {
            self.pnr = Some(pnr.clone());
        }
        if let Some(deadline) = update.payment_deadline {
            self.payment_deadline = Some(deadline);
        }
        if let Some(intent_id) = &update.payment_intent_id {
            self.payment_intent_id = Some(intent_id.clone());
        }
        if let Some(documents) = &update.documents {
            self.documents = documents.clone();
        }
        if let Some(change) = &update.airline_change {
            self.airline_change = Some(change.clone());
        }
        if let Some(cancellation) = &update.cancellation {
            self.cancellation = Some(cancellation.clone());
        }
        if let Some(note) = &update.append_admin_note {
            let line = format!("[{}] {}", now.to_rfc3339(), note);
            self.admin_notes = Some(match self.admin_notes.take() {
                Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, line),
                _ => line,
            });
        }
        if let Some(flag) = update.requires_review {
            self.requires_review = flag;
        }
        if let Some(synced) = update.last_synced_at {
            self.last_synced_at = Some(synced);
        }
        self.updated_at = now;
    }
}

/// Apply payment-deadline expiry: a booking still awaiting payment past its
/// deadline is expired.
pub fn enforce_deadline(
    status: BookingStatus,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BookingStatus {
    match deadline {
        Some(d) if status.awaits_payment() && d <= now => BookingStatus::Expired,
        _ => status,
    }
}

/// Field-level changes for a single booking write. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub pnr: Option<String>,
    pub payment_deadline: Option<DateTime<Utc>>,
    pub payment_intent_id: Option<String>,
    pub documents: Option<Vec<TicketDocument>>,
    pub airline_change: Option<AirlineChange>,
    pub cancellation: Option<CancellationRecord>,
    pub append_admin_note: Option<String>,
    pub requires_review: Option<bool>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl BookingUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Generate a human-shareable booking reference
pub(crate) fn generate_reference() -> String {
    // Format: WF-{8 uppercase alphanumerics}
    let id = Uuid::new_v4().simple().to_string();
    format!("WF-{}", id[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_booking;
    use chrono::Duration;

    #[test]
    fn test_reference_format() {
        let booking = sample_booking();
        assert!(booking.reference.starts_with("WF-"));
        assert_eq!(booking.reference.len(), 11);
        assert_eq!(booking.reference, booking.reference.to_uppercase());
    }

    #[test]
    fn test_issued_only_moves_to_cancelled() {
        assert!(BookingStatus::Issued.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Issued.can_transition_to(BookingStatus::Held));
        assert!(!BookingStatus::Issued.can_transition_to(BookingStatus::Pending));
        assert!(!BookingStatus::Issued.can_transition_to(BookingStatus::Failed));
    }

    #[test]
    fn test_terminal_statuses_are_sticky() {
        for terminal in [BookingStatus::Failed, BookingStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                BookingStatus::Pending,
                BookingStatus::Held,
                BookingStatus::Issued,
                BookingStatus::Failed,
                BookingStatus::Cancelled,
                BookingStatus::Expired,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_deadline_enforcement() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));
        let future = Some(now + Duration::hours(1));

        assert_eq!(enforce_deadline(BookingStatus::Held, past, now), BookingStatus::Expired);
        assert_eq!(enforce_deadline(BookingStatus::Pending, past, now), BookingStatus::Expired);
        assert_eq!(enforce_deadline(BookingStatus::Held, future, now), BookingStatus::Held);
        assert_eq!(enforce_deadline(BookingStatus::Issued, past, now), BookingStatus::Issued);
        assert_eq!(enforce_deadline(BookingStatus::Held, None, now), BookingStatus::Held);
    }

    #[test]
    fn test_apply_appends_admin_notes() {
        let mut booking = sample_booking();
        let now = Utc::now();

        booking.apply(
            &BookingUpdate {
                append_admin_note: Some("first".to_string()),
                ..Default::default()
            },
            now,
        );
        booking.apply(
            &BookingUpdate {
                append_admin_note: Some("second".to_string()),
                status: Some(BookingStatus::Held),
                ..Default::default()
            },
            now,
        );

        let notes = booking.admin_notes.unwrap();
        assert_eq!(notes.lines().count(), 2);
        assert!(notes.ends_with("second"));
        assert_eq!(booking.status, BookingStatus::Held);
    }

    #[test]
    fn test_email_match_is_case_insensitive() {
        let booking = sample_booking();
        assert!(booking.contact.email_matches("  traveler@example.COM "));
        assert!(!booking.contact.email_matches("other@example.com"));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [BookingStatus::Held, BookingStatus::Expired] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("confirmed".parse::<BookingStatus>().is_err());
        assert!(PaymentStatus::Paid.is_settled());
        assert!(!PaymentStatus::Pending.is_settled());
    }
}
