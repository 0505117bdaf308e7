use crate::derivation::derive_status;
use crate::models::{
    enforce_deadline, generate_reference, Booking, BookingStatus, ContactInfo, Itinerary, PricingSnapshot,
    TicketDocument,
};
use crate::repository::{BookingRepository, StoreError};
use crate::sync::{fetch_order, DEFAULT_SYNC_TIMEOUT};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use wayfare_core::gateway::{GatewayError, OrderGateway, ProviderOrder};
use wayfare_core::money;
use wayfare_shared::Masked;

/// Reference collisions tolerated before giving up
const REFERENCE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("A booking already exists for provider order {0}")]
    Duplicate(String),

    #[error("Provider order not found: {0}")]
    OrderNotFound(String),

    #[error("Order provider error: {0}")]
    Provider(GatewayError),

    #[error("Provider order cannot be booked: {0}")]
    InvalidOrder(String),

    #[error("Invalid booking request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<GatewayError> for RegistrationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(id) => RegistrationError::OrderNotFound(id),
            other => RegistrationError::Provider(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub provider_order_id: String,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
    /// Agency margin on top of the provider total, in major units
    #[serde(default)]
    pub markup: f64,
}

impl NewBooking {
    fn validate(&self) -> Result<(), RegistrationError> {
        if self.provider_order_id.trim().is_empty() {
            return Err(RegistrationError::InvalidRequest("providerOrderId is required".to_string()));
        }
        let email = self.contact_email.trim();
        if email.len() < 3 || !email.contains('@') {
            return Err(RegistrationError::InvalidRequest("contactEmail is invalid".to_string()));
        }
        if !self.markup.is_finite() || self.markup < 0.0 {
            return Err(RegistrationError::InvalidRequest("markup must be a non-negative amount".to_string()));
        }
        Ok(())
    }
}

/// Creates the local booking record for a freshly placed provider order
pub struct BookingRegistrar {
    repo: Arc<dyn BookingRepository>,
    orders: Arc<dyn OrderGateway>,
    timeout: Duration,
}

impl BookingRegistrar {
    pub fn new(repo: Arc<dyn BookingRepository>, orders: Arc<dyn OrderGateway>) -> Self {
        Self {
            repo,
            orders,
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn register(&self, request: NewBooking) -> Result<Booking, RegistrationError> {
        request.validate()?;
        let order_id = request.provider_order_id.trim();

        if self
            .repo
            .find_by_provider_order(order_id)
            .await
            .map_err(RegistrationError::Store)?
            .is_some()
        {
            return Err(RegistrationError::Duplicate(order_id.to_string()));
        }

        let order = fetch_order(self.orders.as_ref(), order_id, self.timeout).await?;
        let mut booking = booking_from_order(&order, &request)?;

        for attempt in 1..=REFERENCE_ATTEMPTS {
            match self.repo.insert(&booking).await {
                Ok(()) => {
                    info!(
                        booking_id = %booking.id,
                        reference = %booking.reference,
                        order_id = %order_id,
                        status = %booking.status,
                        "Booking registered"
                    );
                    return Ok(booking);
                }
                Err(StoreError::Duplicate(field)) if field == "reference" && attempt < REFERENCE_ATTEMPTS => {
                    warn!(reference = %booking.reference, "Booking reference collision, regenerating");
                    booking.reference = generate_reference();
                }
                Err(StoreError::Duplicate(_)) => {
                    return Err(RegistrationError::Duplicate(order_id.to_string()));
                }
                Err(e) => return Err(RegistrationError::Store(e)),
            }
        }
        Err(RegistrationError::Duplicate(order_id.to_string()))
    }
}

fn booking_from_order(order: &ProviderOrder, request: &NewBooking) -> Result<Booking, RegistrationError> {
    let currency = order
        .total_currency
        .as_deref()
        .ok_or_else(|| RegistrationError::InvalidOrder("order has no currency".to_string()))?;
    let base_fare = order
        .total_amount
        .as_deref()
        .ok_or_else(|| RegistrationError::InvalidOrder("order has no total".to_string()))
        .and_then(|raw| money::parse_amount(raw).map_err(|e| RegistrationError::InvalidOrder(e.to_string())))?;

    let scale = 10f64.powi(money::currency_exponent(currency) as i32);
    let pricing = PricingSnapshot {
        base_fare,
        markup: request.markup,
        total_amount: ((base_fare + request.markup) * scale).round() / scale,
        currency: currency.to_ascii_uppercase(),
    };
    pricing
        .minor_units()
        .map_err(|e| RegistrationError::InvalidOrder(e.to_string()))?;

    let contact = ContactInfo {
        email: Masked::new(request.contact_email.trim().to_string()),
        phone: request
            .contact_phone
            .as_ref()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(Masked::new),
    };

    let derived = derive_status(order);
    // An order with no lifecycle signal yet is still being set up at the provider
    let initial = match derived.status {
        BookingStatus::Failed => BookingStatus::Pending,
        other => other,
    };

    let mut booking = Booking::new(contact, pricing);
    booking.provider_order_id = Some(order.id.clone());
    booking.status = enforce_deadline(initial, derived.payment_deadline, Utc::now());
    booking.pnr = derived.booking_reference;
    booking.payment_deadline = derived.payment_deadline;
    booking.itinerary = Itinerary::from_order(order);
    booking.documents = order.documents.iter().map(TicketDocument::from).collect();
    booking.last_synced_at = Some(Utc::now());
    Ok(booking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::held_order;
    use crate::memory::MemoryBookingRepository;
    use wayfare_core::gateway::{ProviderPassenger, ProviderSegment, ProviderSlice};
    use wayfare_core::mock::MockOrderGateway;

    fn request(order_id: &str) -> NewBooking {
        NewBooking {
            provider_order_id: order_id.to_string(),
            contact_email: "traveler@example.com".to_string(),
            contact_phone: Some("+44 7700 900123".to_string()),
            markup: 31.2,
        }
    }

    fn registrar(order: ProviderOrder) -> (Arc<MemoryBookingRepository>, Arc<MockOrderGateway>, BookingRegistrar) {
        let repo = Arc::new(MemoryBookingRepository::new());
        let gateway = Arc::new(MockOrderGateway::new().with_order(order));
        let registrar = BookingRegistrar::new(repo.clone(), gateway.clone());
        (repo, gateway, registrar)
    }

    #[tokio::test]
    async fn test_register_snapshots_order() {
        let mut order = held_order("ord_1");
        order.slices.push(ProviderSlice {
            segments: vec![ProviderSegment {
                origin: "LHR".to_string(),
                destination: "JFK".to_string(),
                marketing_carrier: "BA".to_string(),
                flight_number: "117".to_string(),
                ..Default::default()
            }],
        });
        order.passengers.push(ProviderPassenger {
            id: "pas_1".to_string(),
            given_name: "Ada".to_string(),
            family_name: "Lovelace".to_string(),
            passenger_type: Some("adult".to_string()),
        });
        let (repo, _, registrar) = registrar(order);

        let booking = registrar.register(request("ord_1")).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Held);
        assert_eq!(booking.pnr.as_deref(), Some("RZPNX8"));
        assert_eq!(booking.pricing.base_fare, 400.0);
        assert_eq!(booking.pricing.total_amount, 431.2);
        assert_eq!(booking.pricing.minor_units().unwrap(), 43120);
        assert_eq!(booking.itinerary.segments[0].carrier, "BA");
        assert_eq!(booking.itinerary.passengers[0].family_name, "Lovelace");
        assert!(booking.payment_deadline.is_some());
        assert!(repo.find_by_provider_order("ord_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_order_is_rejected() {
        let (_, gateway, registrar) = registrar(held_order("ord_1"));
        registrar.register(request("ord_1")).await.unwrap();

        let result = registrar.register(request("ord_1")).await;

        assert!(matches!(result, Err(RegistrationError::Duplicate(_))));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_order_and_provider_failure() {
        let (_, gateway, registrar) = registrar(held_order("ord_1"));
        assert!(matches!(
            registrar.register(request("ord_missing")).await,
            Err(RegistrationError::OrderNotFound(_))
        ));

        gateway.fail_with(GatewayError::Timeout);
        assert!(matches!(
            registrar.register(request("ord_1")).await,
            Err(RegistrationError::Provider(GatewayError::Timeout))
        ));
    }

    #[tokio::test]
    async fn test_order_without_price_is_not_booked() {
        let mut order = held_order("ord_1");
        order.total_amount = None;
        let (repo, _, registrar) = registrar(order);

        assert!(matches!(
            registrar.register(request("ord_1")).await,
            Err(RegistrationError::InvalidOrder(_))
        ));
        assert_eq!(repo.write_count(), 0);
    }

    #[tokio::test]
    async fn test_order_without_signals_starts_pending() {
        let mut order = held_order("ord_1");
        order.payment_status = Default::default();
        let (_, _, registrar) = registrar(order);

        let booking = registrar.register(request("ord_1")).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (_, gateway, registrar) = registrar(held_order("ord_1"));
        let mut bad_email = request("ord_1");
        bad_email.contact_email = "nobody".to_string();
        let mut bad_markup = request("ord_1");
        bad_markup.markup = -1.0;

        for req in [bad_email, bad_markup] {
            assert!(matches!(
                registrar.register(req).await,
                Err(RegistrationError::InvalidRequest(_))
            ));
        }
        assert_eq!(gateway.calls(), 0);
    }
}
