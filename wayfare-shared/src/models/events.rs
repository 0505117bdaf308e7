use uuid::Uuid;

/// Customer-facing notifications emitted by webhook ingestion.
///
/// Published keyed by booking reference so that a downstream mailer sees the
/// events for one booking in order.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookingEvent {
    TicketsIssued(TicketsIssuedEvent),
    BookingHeld(BookingHeldEvent),
    PaymentSucceeded(PaymentEvent),
    PaymentFailed(PaymentEvent),
    BookingCancelled(BookingCancelledEvent),
    AirlineChangeDetected(AirlineChangeEvent),
}

impl BookingEvent {
    pub fn booking_reference(&self) -> &str {
        match self {
            BookingEvent::TicketsIssued(e) => &e.booking_reference,
            BookingEvent::BookingHeld(e) => &e.booking_reference,
            BookingEvent::PaymentSucceeded(e) | BookingEvent::PaymentFailed(e) => &e.booking_reference,
            BookingEvent::BookingCancelled(e) => &e.booking_reference,
            BookingEvent::AirlineChangeDetected(e) => &e.booking_reference,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BookingEvent::TicketsIssued(_) => "tickets_issued",
            BookingEvent::BookingHeld(_) => "booking_held",
            BookingEvent::PaymentSucceeded(_) => "payment_succeeded",
            BookingEvent::PaymentFailed(_) => "payment_failed",
            BookingEvent::BookingCancelled(_) => "booking_cancelled",
            BookingEvent::AirlineChangeDetected(_) => "airline_change_detected",
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TicketsIssuedEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub pnr: Option<String>,
    pub document_urls: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingHeldEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub payment_deadline: Option<i64>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub refund_amount: Option<String>,
    pub refund_currency: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct AirlineChangeEvent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub timestamp: i64,
}
