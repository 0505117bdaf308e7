use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    /// Whether a client may still confirm this intent
    pub fn is_reusable(&self) -> bool {
        !matches!(self, IntentStatus::Succeeded | IntentStatus::Canceled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub amount: i64, // minor units
    pub currency: String,
    pub status: IntentStatus,
    pub client_secret: Option<String>,
}

impl PaymentIntent {
    pub fn matches(&self, amount: i64, currency: &str) -> bool {
        self.amount == amount && self.currency.eq_ignore_ascii_case(currency)
    }
}

/// Parameters for opening a new charge authorization
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub amount: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentGatewayError {
    #[error("Payment intent not found: {0}")]
    NotFound(String),
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("Payment provider unreachable: {0}")]
    Transport(String),
    #[error("Payment provider response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent with the provider
    async fn create_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentGatewayError>;

    /// Retrieve intent status
    async fn retrieve_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, PaymentGatewayError>;
}
