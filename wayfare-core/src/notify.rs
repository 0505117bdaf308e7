use async_trait::async_trait;
use wayfare_shared::models::events::BookingEvent;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification could not be encoded: {0}")]
    Encode(String),
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound channel for customer-facing booking notifications
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError>;
}

/// Notifier used when no broker is configured; records the event in the log only
pub struct LogNotifier;

#[async_trait]
impl BookingNotifier for LogNotifier {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        tracing::info!(
            event = event.name(),
            booking_reference = event.booking_reference(),
            "Booking notification (no broker configured)"
        );
        Ok(())
    }
}
