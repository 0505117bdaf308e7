pub mod models;
pub mod repository;
pub mod memory;
pub mod derivation;
pub mod sync;
pub mod signature;
pub mod webhook;
pub mod payment;
pub mod lookup;
pub mod registration;

pub use models::{Booking, BookingStatus, BookingUpdate, PaymentStatus};
pub use repository::{BookingRepository, StoreError};
pub use memory::MemoryBookingRepository;
pub use sync::{SmartSync, SyncOutcome, SyncTarget};
pub use signature::{SignatureError, SignatureVerifier};
pub use webhook::{WebhookEvent, WebhookProcessor, WebhookOutcome, WebhookError};
pub use payment::{PaymentBridge, PaymentPolicy, PaymentError, CheckoutSession};
pub use lookup::{StatusLookup, LookupError, PublicBookingView};
pub use registration::{BookingRegistrar, NewBooking, RegistrationError};

#[cfg(test)]
pub(crate) mod fixtures;
