use crate::models::{
    enforce_deadline, AirlineChange, Booking, BookingStatus, BookingUpdate, CancellationRecord,
    PaymentStatus, TicketDocument,
};
use crate::repository::{apply_with_retry, BookingRepository, StoreError, WriteResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use wayfare_core::gateway::ProviderOrder;
use wayfare_core::notify::BookingNotifier;
use wayfare_shared::models::events::{
    AirlineChangeEvent, BookingCancelledEvent, BookingEvent, BookingHeldEvent, PaymentEvent,
    TicketsIssuedEvent,
};

// ============================================================================
// Event Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    TicketsIssued,
    OrderCreated,
    PaymentSucceeded,
    PaymentFailed,
    CancellationConfirmed,
    AirlineInitiatedChange,
    OrderCreationFailed,
}

/// Provider event names and the variant each decodes to
const EVENT_TYPES: &[(&str, EventKind)] = &[
    ("order.tickets_issued", EventKind::TicketsIssued),
    ("order.documents_issued", EventKind::TicketsIssued),
    ("order.created", EventKind::OrderCreated),
    ("payment.succeeded", EventKind::PaymentSucceeded),
    ("payment.failed", EventKind::PaymentFailed),
    ("order_cancellation.confirmed", EventKind::CancellationConfirmed),
    ("order.airline_initiated_change_detected", EventKind::AirlineInitiatedChange),
    ("order.creation_failed", EventKind::OrderCreationFailed),
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PaymentEventData {
    pub order_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CancellationEventData {
    pub order_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_amount: Option<String>,
    #[serde(default)]
    pub refund_currency: Option<String>,
    #[serde(default)]
    pub refund_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AirlineChangeEventData {
    pub order_id: String,
    /// The event's data object, kept verbatim for review
    pub payload: Value,
}

#[derive(Deserialize)]
struct OrderRef {
    order_id: String,
}

/// One inbound provider event. Order-lifecycle variants carry the order as
/// their own object; payment, cancellation and airline-change variants carry
/// an `order_id` reference.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    TicketsIssued(ProviderOrder),
    OrderCreated(ProviderOrder),
    PaymentSucceeded(PaymentEventData),
    PaymentFailed(PaymentEventData),
    CancellationConfirmed(CancellationEventData),
    AirlineInitiatedChange(AirlineChangeEventData),
    OrderCreationFailed(Value),
    Unrecognized { event_type: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The body is not a JSON event envelope
    #[error("Malformed webhook body: {0}")]
    Malformed(String),

    /// A recognized event whose data lacks the fields it needs
    #[error("Invalid {event_type} payload: {reason}")]
    InvalidPayload { event_type: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookEvent {
    /// Decode a raw webhook body. Unknown event types decode to `Unrecognized`.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

        let kind = EVENT_TYPES
            .iter()
            .find(|(name, _)| *name == envelope.event_type)
            .map(|(_, kind)| *kind);

        let Some(kind) = kind else {
            return Ok(WebhookEvent::Unrecognized {
                event_type: envelope.event_type,
            });
        };

        let data = envelope.data;
        let invalid = |e: serde_json::Error| WebhookError::InvalidPayload {
            event_type: envelope.event_type.clone(),
            reason: e.to_string(),
        };

        let event = match kind {
            EventKind::TicketsIssued => WebhookEvent::TicketsIssued(decode_order(data).map_err(invalid)?),
            EventKind::OrderCreated => WebhookEvent::OrderCreated(decode_order(data).map_err(invalid)?),
            EventKind::PaymentSucceeded => {
                WebhookEvent::PaymentSucceeded(serde_json::from_value(data).map_err(invalid)?)
            }
            EventKind::PaymentFailed => {
                WebhookEvent::PaymentFailed(serde_json::from_value(data).map_err(invalid)?)
            }
            EventKind::CancellationConfirmed => {
                WebhookEvent::CancellationConfirmed(serde_json::from_value(data).map_err(invalid)?)
            }
            EventKind::AirlineInitiatedChange => {
                let reference: OrderRef = serde_json::from_value(data.clone()).map_err(invalid)?;
                WebhookEvent::AirlineInitiatedChange(AirlineChangeEventData {
                    order_id: reference.order_id,
                    payload: data,
                })
            }
            EventKind::OrderCreationFailed => WebhookEvent::OrderCreationFailed(data),
        };
        Ok(event)
    }

    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::TicketsIssued(_) => "order.tickets_issued",
            WebhookEvent::OrderCreated(_) => "order.created",
            WebhookEvent::PaymentSucceeded(_) => "payment.succeeded",
            WebhookEvent::PaymentFailed(_) => "payment.failed",
            WebhookEvent::CancellationConfirmed(_) => "order_cancellation.confirmed",
            WebhookEvent::AirlineInitiatedChange(_) => "order.airline_initiated_change_detected",
            WebhookEvent::OrderCreationFailed(_) => "order.creation_failed",
            WebhookEvent::Unrecognized { event_type } => event_type,
        }
    }

    /// The provider order id this event is about, resolved per event family
    pub fn order_id(&self) -> Option<&str> {
        match self {
            WebhookEvent::TicketsIssued(order) | WebhookEvent::OrderCreated(order) => Some(&order.id),
            WebhookEvent::PaymentSucceeded(p) | WebhookEvent::PaymentFailed(p) => Some(&p.order_id),
            WebhookEvent::CancellationConfirmed(c) => Some(&c.order_id),
            WebhookEvent::AirlineInitiatedChange(a) => Some(&a.order_id),
            WebhookEvent::OrderCreationFailed(_) | WebhookEvent::Unrecognized { .. } => None,
        }
    }
}

fn decode_order(data: Value) -> Result<ProviderOrder, serde_json::Error> {
    let order: ProviderOrder = serde_json::from_value(data)?;
    if order.id.is_empty() {
        return Err(serde::de::Error::missing_field("id"));
    }
    Ok(order)
}

// ============================================================================
// Transitions
// ============================================================================

/// The single write an event implies for `booking`, or `None` if the booking
/// already reflects it.
pub fn plan_transition(event: &WebhookEvent, booking: &Booking, now: DateTime<Utc>) -> Option<BookingUpdate> {
    let update = match event {
        WebhookEvent::TicketsIssued(order) => {
            if booking.status.is_terminal() {
                return None;
            }
            let documents: Vec<TicketDocument> = order.documents.iter().map(TicketDocument::from).collect();
            BookingUpdate {
                status: booking.transition_to(BookingStatus::Issued),
                documents: Some(documents).filter(|d| !d.is_empty() && *d != booking.documents),
                pnr: changed_pnr(booking, order),
                ..Default::default()
            }
        }
        WebhookEvent::OrderCreated(order) => {
            if !booking.status.awaits_payment() {
                return None;
            }
            let deadline = order.payment_status.payment_required_by;
            let target = enforce_deadline(BookingStatus::Held, deadline.or(booking.payment_deadline), now);
            BookingUpdate {
                status: if target != booking.status { booking.transition_to(target) } else { None },
                payment_deadline: deadline.filter(|d| booking.payment_deadline != Some(*d)),
                pnr: changed_pnr(booking, order),
                ..Default::default()
            }
        }
        WebhookEvent::PaymentSucceeded(_) => {
            if !matches!(booking.payment_status, PaymentStatus::Unpaid | PaymentStatus::Pending) {
                return None;
            }
            BookingUpdate {
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            }
        }
        WebhookEvent::PaymentFailed(payment) => {
            let status = booking.transition_to(BookingStatus::Failed)?;
            BookingUpdate {
                status: Some(status),
                append_admin_note: Some(format!(
                    "Payment failed: {}",
                    payment.failure_reason.as_deref().unwrap_or("no reason supplied")
                )),
                ..Default::default()
            }
        }
        WebhookEvent::CancellationConfirmed(cancellation) => {
            let record = CancellationRecord {
                confirmed_at: cancellation.confirmed_at.or(Some(now)),
                refund_amount: cancellation.refund_amount.clone(),
                refund_currency: cancellation.refund_currency.clone(),
                refund_to: cancellation.refund_to.clone(),
            };
            let record_changed = booking
                .cancellation
                .as_ref()
                .map_or(true, |existing| !same_cancellation(existing, &record));
            BookingUpdate {
                status: booking.transition_to(BookingStatus::Cancelled),
                cancellation: Some(record).filter(|_| record_changed),
                ..Default::default()
            }
        }
        WebhookEvent::AirlineInitiatedChange(change) => {
            if booking.airline_change.as_ref().map(|c| &c.payload) == Some(&change.payload) {
                return None;
            }
            BookingUpdate {
                airline_change: Some(AirlineChange {
                    received_at: now,
                    payload: change.payload.clone(),
                }),
                requires_review: Some(true),
                append_admin_note: Some("Airline-initiated change detected; review required".to_string()),
                ..Default::default()
            }
        }
        WebhookEvent::OrderCreationFailed(_) | WebhookEvent::Unrecognized { .. } => return None,
    };

    Some(update).filter(|u| !u.is_empty())
}

fn changed_pnr(booking: &Booking, order: &ProviderOrder) -> Option<String> {
    order
        .booking_reference
        .as_ref()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty() && booking.pnr.as_deref() != Some(r.as_str()))
}

/// Redelivery of a cancellation without an explicit timestamp must not count as new
fn same_cancellation(existing: &CancellationRecord, incoming: &CancellationRecord) -> bool {
    existing.refund_amount == incoming.refund_amount
        && existing.refund_currency == incoming.refund_currency
        && existing.refund_to == incoming.refund_to
}

// ============================================================================
// Processor
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Applied { booking_id: Uuid },
    Unchanged { booking_id: Uuid },
    BookingNotFound,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Unchanged { .. } => "unchanged",
            WebhookOutcome::BookingNotFound => "booking_not_found",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Applies verified provider events to bookings. Signature checks happen
/// before an event reaches this type.
pub struct WebhookProcessor {
    repo: Arc<dyn BookingRepository>,
    notifier: Arc<dyn BookingNotifier>,
}

impl WebhookProcessor {
    pub fn new(repo: Arc<dyn BookingRepository>, notifier: Arc<dyn BookingNotifier>) -> Self {
        Self { repo, notifier }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        let order_id = match event {
            WebhookEvent::OrderCreationFailed(data) => {
                warn!(payload = %data, "Provider reported order creation failure; no booking to update");
                return Ok(WebhookOutcome::Ignored);
            }
            WebhookEvent::Unrecognized { event_type } => {
                info!(event_type = %event_type, "Ignoring unrecognized webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
            _ => match event.order_id() {
                Some(id) => id,
                None => return Ok(WebhookOutcome::Ignored),
            },
        };

        let Some(booking) = self.repo.find_by_provider_order(order_id).await? else {
            warn!(event_type = event.event_type(), order_id = %order_id, "Webhook for unknown booking");
            return Ok(WebhookOutcome::BookingNotFound);
        };

        let before = booking.clone();
        let now = Utc::now();
        let result = apply_with_retry(self.repo.as_ref(), booking, |current| {
            plan_transition(event, current, now)
        })
        .await?;

        match result {
            WriteResult::Written(after) => {
                info!(
                    booking_id = %after.id,
                    event_type = event.event_type(),
                    status = %after.status,
                    payment_status = %after.payment_status,
                    "Webhook applied"
                );
                if let Some(notification) = notification_for(event, &before, &after) {
                    if let Err(e) = self.notifier.notify(&notification).await {
                        warn!(booking_id = %after.id, "Failed to publish booking notification: {}", e);
                    }
                }
                Ok(WebhookOutcome::Applied { booking_id: after.id })
            }
            WriteResult::Unchanged(current) => {
                info!(booking_id = %current.id, event_type = event.event_type(), "Webhook already reflected, no write");
                Ok(WebhookOutcome::Unchanged { booking_id: current.id })
            }
        }
    }
}

fn notification_for(event: &WebhookEvent, before: &Booking, after: &Booking) -> Option<BookingEvent> {
    let timestamp = Utc::now().timestamp();
    let status_became = |status: BookingStatus| before.status != status && after.status == status;

    match event {
        WebhookEvent::TicketsIssued(_) if status_became(BookingStatus::Issued) => {
            Some(BookingEvent::TicketsIssued(TicketsIssuedEvent {
                booking_id: after.id,
                booking_reference: after.reference.clone(),
                pnr: after.pnr.clone(),
                document_urls: after.documents.iter().filter_map(|d| d.url.clone()).collect(),
                timestamp,
            }))
        }
        WebhookEvent::OrderCreated(_) if status_became(BookingStatus::Held) => {
            Some(BookingEvent::BookingHeld(BookingHeldEvent {
                booking_id: after.id,
                booking_reference: after.reference.clone(),
                payment_deadline: after.payment_deadline.map(|d| d.timestamp()),
                timestamp,
            }))
        }
        WebhookEvent::PaymentSucceeded(_) => Some(BookingEvent::PaymentSucceeded(PaymentEvent {
            booking_id: after.id,
            booking_reference: after.reference.clone(),
            reason: None,
            timestamp,
        })),
        WebhookEvent::PaymentFailed(payment) => Some(BookingEvent::PaymentFailed(PaymentEvent {
            booking_id: after.id,
            booking_reference: after.reference.clone(),
            reason: payment.failure_reason.clone(),
            timestamp,
        })),
        WebhookEvent::CancellationConfirmed(c) if status_became(BookingStatus::Cancelled) => {
            Some(BookingEvent::BookingCancelled(BookingCancelledEvent {
                booking_id: after.id,
                booking_reference: after.reference.clone(),
                refund_amount: c.refund_amount.clone(),
                refund_currency: c.refund_currency.clone(),
                timestamp,
            }))
        }
        WebhookEvent::AirlineInitiatedChange(_) => {
            Some(BookingEvent::AirlineChangeDetected(AirlineChangeEvent {
                booking_id: after.id,
                booking_reference: after.reference.clone(),
                timestamp,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::held_booking;
    use crate::memory::MemoryBookingRepository;
    use serde_json::json;
    use wayfare_core::mock::RecordingNotifier;

    fn processor() -> (Arc<MemoryBookingRepository>, Arc<RecordingNotifier>, WebhookProcessor) {
        let repo = Arc::new(MemoryBookingRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let processor = WebhookProcessor::new(repo.clone(), notifier.clone());
        (repo, notifier, processor)
    }

    fn event(value: Value) -> WebhookEvent {
        WebhookEvent::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_order_id_resolved_per_event_family() {
        let issued = event(json!({"type": "order.tickets_issued", "data": {"id": "ord_1"}}));
        assert_eq!(issued.order_id(), Some("ord_1"));

        let paid = event(json!({"type": "payment.succeeded", "data": {"id": "pay_9", "order_id": "ord_2"}}));
        assert_eq!(paid.order_id(), Some("ord_2"));

        let cancelled = event(json!({"type": "order_cancellation.confirmed", "data": {"id": "ore_3", "order_id": "ord_3"}}));
        assert_eq!(cancelled.order_id(), Some("ord_3"));
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let parsed = event(json!({"type": "order.seat_map_refreshed", "data": {}}));
        assert_eq!(
            parsed,
            WebhookEvent::Unrecognized { event_type: "order.seat_map_refreshed".to_string() }
        );
    }

    #[test]
    fn test_recognized_event_without_identifier_is_invalid() {
        let body = json!({"type": "payment.failed", "data": {"id": "pay_1"}}).to_string();
        assert!(matches!(
            WebhookEvent::parse(body.as_bytes()),
            Err(WebhookError::InvalidPayload { event_type, .. }) if event_type == "payment.failed"
        ));
        assert!(matches!(WebhookEvent::parse(b"not json"), Err(WebhookError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_tickets_issued_stores_documents_once() {
        let (repo, notifier, processor) = processor();
        let booking = held_booking("ord_1");
        repo.insert(&booking).await.unwrap();

        let issued = event(json!({
            "type": "order.tickets_issued",
            "data": {"id": "ord_1", "documents": [{"type": "boarding_pass", "url": "https://docs.example/bp.pdf"}]}
        }));

        let outcome = processor.process(&issued).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { booking_id: booking.id });

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Issued);
        assert_eq!(stored.documents.len(), 1);
        assert_eq!(stored.documents[0].document_type, "boarding_pass");

        let writes = repo.write_count();
        let again = processor.process(&issued).await.unwrap();
        assert_eq!(again, WebhookOutcome::Unchanged { booking_id: booking.id });
        assert_eq!(repo.write_count(), writes);
        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn test_order_created_holds_with_deadline() {
        let (repo, _, processor) = processor();
        let mut booking = held_booking("ord_1");
        booking.status = BookingStatus::Pending;
        booking.payment_deadline = None;
        repo.insert(&booking).await.unwrap();

        let deadline = Utc::now() + chrono::Duration::hours(12);
        let created = event(json!({
            "type": "order.created",
            "data": {"id": "ord_1", "payment_status": {"payment_required_by": deadline}}
        }));
        processor.process(&created).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Held);
        assert_eq!(stored.payment_deadline, Some(deadline));
    }

    #[tokio::test]
    async fn test_payment_failed_records_reason() {
        let (repo, notifier, processor) = processor();
        let booking = held_booking("ord_1");
        repo.insert(&booking).await.unwrap();

        let failed = event(json!({
            "type": "payment.failed",
            "data": {"order_id": "ord_1", "failure_reason": "card_declined"}
        }));
        processor.process(&failed).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Failed);
        assert!(stored.admin_notes.unwrap().contains("card_declined"));
        assert!(matches!(notifier.events()[0], BookingEvent::PaymentFailed(_)));
    }

    #[tokio::test]
    async fn test_payment_succeeded_marks_paid() {
        let (repo, _, processor) = processor();
        let booking = held_booking("ord_1");
        repo.insert(&booking).await.unwrap();

        let paid = event(json!({"type": "payment.succeeded", "data": {"order_id": "ord_1"}}));
        processor.process(&paid).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(stored.status, BookingStatus::Held);
    }

    #[tokio::test]
    async fn test_cancellation_on_failed_booking_updates_record_only() {
        let (repo, _, processor) = processor();
        let mut booking = held_booking("ord_1");
        booking.status = BookingStatus::Failed;
        repo.insert(&booking).await.unwrap();

        let cancelled = event(json!({
            "type": "order_cancellation.confirmed",
            "data": {"order_id": "ord_1", "refund_amount": "90.80", "refund_currency": "GBP"}
        }));
        processor.process(&cancelled).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Failed);
        assert_eq!(stored.cancellation.unwrap().refund_amount.as_deref(), Some("90.80"));
    }

    #[tokio::test]
    async fn test_cancellation_confirmed_cancels_issued_booking() {
        let (repo, _, processor) = processor();
        let mut booking = held_booking("ord_1");
        booking.status = BookingStatus::Issued;
        repo.insert(&booking).await.unwrap();

        let cancelled = event(json!({"type": "order_cancellation.confirmed", "data": {"order_id": "ord_1"}}));
        processor.process(&cancelled).await.unwrap();
        let writes = repo.write_count();
        processor.process(&cancelled).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(repo.write_count(), writes);
    }

    #[tokio::test]
    async fn test_airline_change_flags_review_without_status_change() {
        let (repo, _, processor) = processor();
        let mut booking = held_booking("ord_1");
        booking.status = BookingStatus::Issued;
        repo.insert(&booking).await.unwrap();

        let change = event(json!({
            "type": "order.airline_initiated_change_detected",
            "data": {"id": "aic_1", "order_id": "ord_1", "added": [], "removed": []}
        }));
        processor.process(&change).await.unwrap();

        let stored = repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Issued);
        assert!(stored.requires_review);
        assert_eq!(stored.airline_change.unwrap().payload["id"], "aic_1");
    }

    #[tokio::test]
    async fn test_unknown_booking_and_ignored_events_do_not_write() {
        let (repo, _, processor) = processor();

        let issued = event(json!({"type": "order.tickets_issued", "data": {"id": "ord_missing"}}));
        assert_eq!(processor.process(&issued).await.unwrap(), WebhookOutcome::BookingNotFound);

        let failed = event(json!({"type": "order.creation_failed", "data": {"error": "offer expired"}}));
        assert_eq!(processor.process(&failed).await.unwrap(), WebhookOutcome::Ignored);

        let unknown = event(json!({"type": "air.something_new", "data": {}}));
        assert_eq!(processor.process(&unknown).await.unwrap(), WebhookOutcome::Ignored);

        assert_eq!(repo.write_count(), 0);
    }

    #[tokio::test]
    async fn test_tickets_for_cancelled_booking_are_ignored() {
        let (repo, _, processor) = processor();
        let mut booking = held_booking("ord_1");
        booking.status = BookingStatus::Cancelled;
        repo.insert(&booking).await.unwrap();

        let issued = event(json!({
            "type": "order.tickets_issued",
            "data": {"id": "ord_1", "documents": [{"type": "electronic_ticket"}]}
        }));
        let outcome = processor.process(&issued).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Unchanged { booking_id: booking.id });
        assert_eq!(repo.get(booking.id).await.unwrap().unwrap().status, BookingStatus::Cancelled);
    }
}
