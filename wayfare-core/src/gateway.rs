use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Order Models
// ============================================================================

/// The provider's authoritative view of a flight order.
///
/// Shared by the HTTP gateway (order fetch) and webhook ingestion (order
/// lifecycle events embed the same object), so every field tolerates absence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderOrder {
    pub id: String,
    pub booking_reference: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub documents: Vec<ProviderDocument>,
    pub payment_status: ProviderPaymentStatus,
    pub total_amount: Option<String>,
    pub total_currency: Option<String>,
    pub slices: Vec<ProviderSlice>,
    pub passengers: Vec<ProviderPassenger>,
    pub conditions: ProviderConditions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderPaymentStatus {
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_required_by: Option<DateTime<Utc>>,
    pub price_guarantee_expires_at: Option<DateTime<Utc>>,
    pub awaiting_payment: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderDocument {
    pub unique_identifier: Option<String>,
    #[serde(rename = "type")]
    pub document_type: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSlice {
    pub segments: Vec<ProviderSegment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSegment {
    pub origin: String,
    pub destination: String,
    pub departing_at: String,
    pub arriving_at: String,
    pub marketing_carrier: String,
    pub flight_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderPassenger {
    pub id: String,
    pub given_name: String,
    pub family_name: String,
    #[serde(rename = "type")]
    pub passenger_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConditions {
    pub refundable: bool,
    pub changeable: bool,
}

impl ProviderOrder {
    /// Earliest provider-side moment after which the order can no longer be paid.
    pub fn payment_expiry(&self) -> Option<DateTime<Utc>> {
        match (
            self.payment_status.payment_required_by,
            self.payment_status.price_guarantee_expires_at,
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

// ============================================================================
// Gateway Trait
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Order provider request timed out")]
    Timeout,
    #[error("Order not found at provider: {0}")]
    NotFound(String),
    #[error("Order provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Order provider unreachable: {0}")]
    Transport(String),
    #[error("Order provider response could not be decoded: {0}")]
    Decode(String),
}

/// Read access to the order provider (GDS aggregator) that owns the flight order.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Fetch the current state of an order by the provider's order id
    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_partial_order_deserializes() {
        let order: ProviderOrder = serde_json::from_value(serde_json::json!({
            "id": "ord_1",
            "documents": [{"type": "electronic_ticket", "unique_identifier": "1252001"}]
        }))
        .unwrap();

        assert_eq!(order.id, "ord_1");
        assert_eq!(order.documents.len(), 1);
        assert!(order.cancelled_at.is_none());
        assert!(order.payment_status.paid_at.is_none());
    }

    #[test]
    fn test_payment_expiry_takes_earliest() {
        let now = Utc::now();
        let mut order = ProviderOrder::default();
        assert!(order.payment_expiry().is_none());

        order.payment_status.payment_required_by = Some(now + Duration::hours(2));
        assert_eq!(order.payment_expiry(), Some(now + Duration::hours(2)));

        order.payment_status.price_guarantee_expires_at = Some(now + Duration::hours(1));
        assert_eq!(order.payment_expiry(), Some(now + Duration::hours(1)));
    }
}
