use crate::models::{Booking, BookingStatus, BookingUpdate, PaymentStatus};
use crate::repository::{apply_with_retry, BookingRepository, StoreError};
use crate::sync::{fetch_order, DEFAULT_SYNC_TIMEOUT};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use wayfare_core::gateway::OrderGateway;
use wayfare_core::payment::{NewPaymentIntent, PaymentGateway, PaymentGatewayError, PaymentIntent};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Booking is {0} and cannot be paid")]
    InvalidStatus(BookingStatus),

    #[error("Booking is already paid")]
    AlreadyPaid,

    #[error("The payment deadline ({0}) has passed")]
    DeadlinePassed(DateTime<Utc>),

    #[error("The booking was cancelled by the airline")]
    CancelledByProvider,

    #[error("The airline's payment deadline ({0}) has passed")]
    ExpiredAtProvider(DateTime<Utc>),

    #[error("Payment intent {intent_id} does not match the booking total")]
    AmountMismatch { intent_id: String },

    #[error("Booking has an invalid stored price: {0}")]
    InvalidStoredAmount(String),

    #[error("Could not confirm the booking with the airline: {0}")]
    ProviderUnavailable(String),

    #[error(transparent)]
    Gateway(#[from] PaymentGatewayError),

    #[error("Payment intent {0} has no client secret")]
    MissingClientSecret(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Knobs for the checkout preconditions
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    /// Block payment when the order provider cannot be reached
    pub strict_provider_check: bool,
    pub provider_timeout: Duration,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            strict_provider_check: false,
            provider_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// What the checkout UI needs to confirm a payment
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub booking_id: Uuid,
    pub intent_id: String,
    pub client_secret: String,
    /// An existing intent was handed back instead of creating one
    pub reused: bool,
}

/// Gates payment intents on booking state
pub struct PaymentBridge {
    repo: Arc<dyn BookingRepository>,
    orders: Arc<dyn OrderGateway>,
    payments: Arc<dyn PaymentGateway>,
    policy: PaymentPolicy,
}

impl PaymentBridge {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        orders: Arc<dyn OrderGateway>,
        payments: Arc<dyn PaymentGateway>,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            repo,
            orders,
            payments,
            policy,
        }
    }

    /// Open or reuse a payment intent for a booking, identified by id or reference.
    pub async fn prepare_checkout(&self, booking_key: &str) -> Result<CheckoutSession, PaymentError> {
        let booking = self.load(booking_key).await?;

        if matches!(
            booking.status,
            BookingStatus::Issued | BookingStatus::Cancelled | BookingStatus::Expired
        ) {
            return Err(PaymentError::InvalidStatus(booking.status));
        }

        if booking.payment_status.is_settled() {
            return Err(PaymentError::AlreadyPaid);
        }

        let now = Utc::now();
        if let Some(deadline) = booking.payment_deadline.filter(|d| *d <= now) {
            self.close(&booking, BookingStatus::Expired, "payment deadline passed before checkout")
                .await;
            return Err(PaymentError::DeadlinePassed(deadline));
        }

        self.check_provider(&booking, now).await?;

        let amount = booking
            .pricing
            .minor_units()
            .map_err(|e| PaymentError::InvalidStoredAmount(e.to_string()))?;
        let currency = booking.pricing.currency.to_ascii_lowercase();

        if let Some(intent_id) = booking.payment_intent_id.as_deref() {
            match self.payments.retrieve_intent(intent_id).await {
                Ok(intent) if intent.status.is_reusable() => {
                    if !intent.matches(amount, &currency) {
                        warn!(
                            booking_id = %booking.id,
                            intent_id = %intent.id,
                            intent_amount = intent.amount,
                            booking_amount = amount,
                            "Stored payment intent no longer matches booking pricing"
                        );
                        return Err(PaymentError::AmountMismatch { intent_id: intent.id });
                    }
                    return session(&booking, intent, true);
                }
                Ok(intent) => {
                    info!(booking_id = %booking.id, intent_id = %intent.id, status = ?intent.status, "Previous intent is finished, opening a new one");
                }
                Err(PaymentGatewayError::NotFound(_)) => {
                    warn!(booking_id = %booking.id, intent_id = %intent_id, "Stored payment intent unknown to provider, opening a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let intent = self
            .payments
            .create_intent(&NewPaymentIntent {
                booking_id: booking.id,
                booking_reference: booking.reference.clone(),
                amount,
                currency,
                receipt_email: Some(booking.contact.email.expose().clone()),
            })
            .await?;

        let intent_id = intent.id.clone();
        apply_with_retry(self.repo.as_ref(), booking.clone(), |current| {
            Some(BookingUpdate {
                payment_intent_id: Some(intent_id.clone()),
                payment_status: (current.payment_status == PaymentStatus::Unpaid).then_some(PaymentStatus::Pending),
                ..Default::default()
            })
        })
        .await?;

        info!(booking_id = %booking.id, intent_id = %intent.id, amount, "Payment intent created");
        session(&booking, intent, false)
    }

    async fn load(&self, key: &str) -> Result<Booking, PaymentError> {
        let key = key.trim();
        let found = match Uuid::parse_str(key) {
            Ok(id) => self.repo.get(id).await?,
            Err(_) => self.repo.find_by_reference(&key.to_ascii_uppercase()).await?,
        };
        found.ok_or_else(|| PaymentError::NotFound(key.to_string()))
    }

    /// Provider-side validity. Fetch failures fail open unless the policy is strict.
    async fn check_provider(&self, booking: &Booking, now: DateTime<Utc>) -> Result<(), PaymentError> {
        let Some(order_id) = booking.provider_order_id.as_deref() else {
            return Ok(());
        };

        let order = match fetch_order(self.orders.as_ref(), order_id, self.policy.provider_timeout).await {
            Ok(order) => order,
            Err(e) if self.policy.strict_provider_check => {
                warn!(booking_id = %booking.id, order_id = %order_id, "Provider check failed, blocking payment: {}", e);
                return Err(PaymentError::ProviderUnavailable(e.to_string()));
            }
            Err(e) => {
                warn!(booking_id = %booking.id, order_id = %order_id, "Provider check failed, allowing payment: {}", e);
                return Ok(());
            }
        };

        if order.cancelled_at.is_some() {
            self.close(booking, BookingStatus::Cancelled, "order cancelled at provider before checkout")
                .await;
            return Err(PaymentError::CancelledByProvider);
        }

        if let Some(expiry) = order.payment_expiry().filter(|e| *e <= now) {
            self.close(booking, BookingStatus::Expired, "provider payment window closed before checkout")
                .await;
            return Err(PaymentError::ExpiredAtProvider(expiry));
        }

        Ok(())
    }

    /// Persist a rejecting transition. The request is refused either way, so a
    /// failed write is only logged.
    async fn close(&self, booking: &Booking, target: BookingStatus, reason: &str) {
        let result = apply_with_retry(self.repo.as_ref(), booking.clone(), |current| {
            current.transition_to(target).map(BookingUpdate::status)
        })
        .await;

        match result {
            Ok(write) if write.was_written() => {
                info!(booking_id = %booking.id, status = %target, "Booking closed at checkout: {}", reason);
            }
            Ok(_) => {}
            Err(e) => warn!(booking_id = %booking.id, "Failed to record {} status: {}", target, e),
        }
    }
}

fn session(booking: &Booking, intent: PaymentIntent, reused: bool) -> Result<CheckoutSession, PaymentError> {
    let client_secret = intent
        .client_secret
        .ok_or_else(|| PaymentError::MissingClientSecret(intent.id.clone()))?;
    Ok(CheckoutSession {
        booking_id: booking.id,
        intent_id: intent.id,
        client_secret,
        reused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{held_booking, held_order};
    use crate::memory::MemoryBookingRepository;
    use chrono::Duration as ChronoDuration;
    use wayfare_core::gateway::GatewayError;
    use wayfare_core::mock::{MockOrderGateway, MockPaymentGateway};
    use wayfare_core::payment::IntentStatus;

    struct Harness {
        repo: Arc<MemoryBookingRepository>,
        orders: Arc<MockOrderGateway>,
        payments: Arc<MockPaymentGateway>,
        bridge: PaymentBridge,
    }

    fn harness(policy: PaymentPolicy) -> Harness {
        let repo = Arc::new(MemoryBookingRepository::new());
        let orders = Arc::new(MockOrderGateway::new().with_order(held_order("ord_1")));
        let payments = Arc::new(MockPaymentGateway::new());
        let bridge = PaymentBridge::new(repo.clone(), orders.clone(), payments.clone(), policy);
        Harness {
            repo,
            orders,
            payments,
            bridge,
        }
    }

    async fn seeded(policy: PaymentPolicy) -> (Harness, Booking) {
        let h = harness(policy);
        let booking = held_booking("ord_1");
        h.repo.insert(&booking).await.unwrap();
        (h, booking)
    }

    #[tokio::test]
    async fn test_creates_intent_and_marks_payment_pending() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;

        let session = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();

        assert!(!session.reused);
        assert!(session.client_secret.starts_with(&session.intent_id));
        let stored = h.repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_intent_id.as_deref(), Some(session.intent_id.as_str()));
        assert_eq!(stored.payment_status, PaymentStatus::Pending);

        let intent = h.payments.retrieve_intent(&session.intent_id).await.unwrap();
        assert_eq!(intent.amount, 43120);
        assert_eq!(intent.currency, "gbp");
    }

    #[tokio::test]
    async fn test_repeat_request_reuses_intent() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;

        let first = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();
        let second = h.bridge.prepare_checkout(&booking.reference).await.unwrap();

        assert_eq!(first.intent_id, second.intent_id);
        assert!(second.reused);
        assert_eq!(h.payments.created(), 1);
    }

    #[tokio::test]
    async fn test_drifted_pricing_is_rejected() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;
        h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();

        let mut drifted = h.repo.get(booking.id).await.unwrap().unwrap();
        drifted.pricing.total_amount = 399.0;
        h.repo.overwrite(drifted).await;

        let result = h.bridge.prepare_checkout(&booking.id.to_string()).await;
        assert!(matches!(result, Err(PaymentError::AmountMismatch { .. })));
        assert_eq!(h.payments.created(), 1);
    }

    #[tokio::test]
    async fn test_finished_intent_is_replaced() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;
        let first = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();
        h.payments.set_status(&first.intent_id, IntentStatus::Canceled);

        let second = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();

        assert_ne!(first.intent_id, second.intent_id);
        let stored = h.repo.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_intent_id.as_deref(), Some(second.intent_id.as_str()));
    }

    #[tokio::test]
    async fn test_passed_deadline_expires_booking() {
        let h = harness(PaymentPolicy::default());
        let mut booking = held_booking("ord_1");
        booking.payment_deadline = Some(Utc::now() - ChronoDuration::hours(1));
        h.repo.insert(&booking).await.unwrap();

        let err = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap_err();

        assert!(matches!(err, PaymentError::DeadlinePassed(_)));
        let message = err.to_string();
        assert!(message.contains("payment deadline") && message.contains("has passed"));
        assert_eq!(h.repo.get(booking.id).await.unwrap().unwrap().status, BookingStatus::Expired);
        assert_eq!(h.orders.calls(), 0);
        assert_eq!(h.payments.created(), 0);
    }

    #[tokio::test]
    async fn test_closed_bookings_are_rejected() {
        let h = harness(PaymentPolicy::default());
        for status in [BookingStatus::Issued, BookingStatus::Cancelled, BookingStatus::Expired] {
            let mut booking = held_booking(&format!("ord_{}", status));
            booking.status = status;
            h.repo.insert(&booking).await.unwrap();

            let result = h.bridge.prepare_checkout(&booking.id.to_string()).await;
            assert!(matches!(result, Err(PaymentError::InvalidStatus(s)) if s == status));
        }

        let mut paid = held_booking("ord_paid");
        paid.payment_status = PaymentStatus::Captured;
        h.repo.insert(&paid).await.unwrap();
        assert!(matches!(
            h.bridge.prepare_checkout(&paid.id.to_string()).await,
            Err(PaymentError::AlreadyPaid)
        ));
    }

    #[tokio::test]
    async fn test_checkout_can_be_retried_after_payment_failure() {
        use crate::webhook::{WebhookEvent, WebhookProcessor};
        use wayfare_core::mock::RecordingNotifier;

        let (h, booking) = seeded(PaymentPolicy::default()).await;
        let first = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();

        let processor = WebhookProcessor::new(h.repo.clone(), Arc::new(RecordingNotifier::new()));
        let declined = WebhookEvent::parse(
            br#"{"type":"payment.failed","data":{"order_id":"ord_1","failure_reason":"card_declined"}}"#,
        )
        .unwrap();
        processor.process(&declined).await.unwrap();
        assert_eq!(h.repo.get(booking.id).await.unwrap().unwrap().status, BookingStatus::Failed);

        let retry = h.bridge.prepare_checkout(&booking.id.to_string()).await.unwrap();
        assert_eq!(retry.intent_id, first.intent_id);
        assert_eq!(h.payments.created(), 1);
    }

    #[tokio::test]
    async fn test_provider_cancellation_blocks_payment() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;
        let mut order = held_order("ord_1");
        order.cancelled_at = Some(Utc::now());
        h.orders.put_order(order);

        let result = h.bridge.prepare_checkout(&booking.id.to_string()).await;

        assert!(matches!(result, Err(PaymentError::CancelledByProvider)));
        assert_eq!(h.repo.get(booking.id).await.unwrap().unwrap().status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_provider_price_guarantee_expiry_blocks_payment() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;
        let mut order = held_order("ord_1");
        order.payment_status.price_guarantee_expires_at = Some(Utc::now() - ChronoDuration::minutes(1));
        h.orders.put_order(order);

        let result = h.bridge.prepare_checkout(&booking.id.to_string()).await;

        assert!(matches!(result, Err(PaymentError::ExpiredAtProvider(_))));
        assert_eq!(h.repo.get(booking.id).await.unwrap().unwrap().status, BookingStatus::Expired);
    }

    #[tokio::test]
    async fn test_provider_outage_fails_open_unless_strict() {
        let (h, booking) = seeded(PaymentPolicy::default()).await;
        h.orders.fail_with(GatewayError::Timeout);
        assert!(h.bridge.prepare_checkout(&booking.id.to_string()).await.is_ok());

        let strict = PaymentPolicy {
            strict_provider_check: true,
            ..Default::default()
        };
        let (h, booking) = seeded(strict).await;
        h.orders.fail_with(GatewayError::Transport("connection reset".to_string()));
        assert!(matches!(
            h.bridge.prepare_checkout(&booking.id.to_string()).await,
            Err(PaymentError::ProviderUnavailable(_))
        ));
        assert_eq!(h.payments.created(), 0);
    }

    #[tokio::test]
    async fn test_invalid_stored_amount_is_not_defaulted() {
        let h = harness(PaymentPolicy::default());
        for total in [0.0, -5.0, f64::NAN] {
            let mut booking = held_booking(&format!("ord_{}", Uuid::new_v4()));
            booking.provider_order_id = None;
            booking.pricing.total_amount = total;
            h.repo.insert(&booking).await.unwrap();

            let result = h.bridge.prepare_checkout(&booking.id.to_string()).await;
            assert!(matches!(result, Err(PaymentError::InvalidStoredAmount(_))));
        }
        assert_eq!(h.payments.created(), 0);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let h = harness(PaymentPolicy::default());
        assert!(matches!(
            h.bridge.prepare_checkout(&Uuid::new_v4().to_string()).await,
            Err(PaymentError::NotFound(_))
        ));
        assert!(matches!(
            h.bridge.prepare_checkout("WF-NOPE0000").await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
