pub mod gateway;
pub mod payment;
pub mod notify;
pub mod money;
pub mod mock;

pub use gateway::{OrderGateway, GatewayError, ProviderOrder};
pub use payment::{PaymentGateway, PaymentGatewayError, PaymentIntent, IntentStatus, NewPaymentIntent};
pub use notify::{BookingNotifier, LogNotifier, NotifyError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
