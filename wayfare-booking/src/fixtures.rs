use crate::models::{Booking, BookingStatus, ContactInfo, PricingSnapshot};
use chrono::{Duration, Utc};
use wayfare_core::gateway::{ProviderOrder, ProviderPaymentStatus};
use wayfare_shared::Masked;

pub fn sample_booking() -> Booking {
    Booking::new(
        ContactInfo {
            email: Masked::from("Traveler@Example.com"),
            phone: None,
        },
        PricingSnapshot {
            base_fare: 400.0,
            markup: 31.2,
            total_amount: 431.2,
            currency: "GBP".to_string(),
        },
    )
}

/// A held booking linked to provider order `order_id`, payable for another day
pub fn held_booking(order_id: &str) -> Booking {
    let mut booking = sample_booking();
    booking.provider_order_id = Some(order_id.to_string());
    booking.status = BookingStatus::Held;
    booking.payment_deadline = Some(Utc::now() + Duration::days(1));
    booking
}

/// A provider order awaiting payment for another day
pub fn held_order(order_id: &str) -> ProviderOrder {
    ProviderOrder {
        id: order_id.to_string(),
        booking_reference: Some("RZPNX8".to_string()),
        payment_status: ProviderPaymentStatus {
            payment_required_by: Some(Utc::now() + Duration::days(1)),
            awaiting_payment: true,
            ..Default::default()
        },
        total_amount: Some("400.00".to_string()),
        total_currency: Some("GBP".to_string()),
        ..Default::default()
    }
}
