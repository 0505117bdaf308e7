//! In-process adapters for sandbox mode and tests.

use crate::gateway::{GatewayError, OrderGateway, ProviderOrder};
use crate::notify::{BookingNotifier, NotifyError};
use crate::payment::{IntentStatus, NewPaymentIntent, PaymentGateway, PaymentGatewayError, PaymentIntent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use wayfare_shared::models::events::BookingEvent;

/// Order gateway backed by a map of canned provider orders
#[derive(Default)]
pub struct MockOrderGateway {
    orders: Mutex<HashMap<String, ProviderOrder>>,
    failure: Mutex<Option<GatewayError>>,
    calls: AtomicUsize,
}

impl MockOrderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(self, order: ProviderOrder) -> Self {
        self.put_order(order);
        self
    }

    pub fn put_order(&self, order: ProviderOrder) {
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(order.id.clone(), order);
        }
    }

    /// Make every subsequent fetch fail with `error` until cleared
    pub fn fail_with(&self, error: GatewayError) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(error);
        }
    }

    pub fn clear_failure(&self) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = None;
        }
    }

    /// Number of `get_order` calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderGateway for MockOrderGateway {
    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .failure
            .lock()
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        self.orders
            .lock()
            .map_err(|e| GatewayError::Transport(e.to_string()))?
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(order_id.to_string()))
    }
}

/// Payment gateway that keeps intents in memory
#[derive(Default)]
pub struct MockPaymentGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    created: AtomicUsize,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of intents created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Simulate the client completing (or abandoning) an intent
    pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
        if let Ok(mut intents) = self.intents.lock() {
            if let Some(intent) = intents.get_mut(intent_id) {
                intent.status = status;
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_intent(
        &self,
        request: &NewPaymentIntent,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        let sequence = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock_pi_{}_{}", request.booking_id.simple(), sequence);
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            amount: request.amount,
            currency: request.currency.to_ascii_lowercase(),
            status: IntentStatus::RequiresPaymentMethod,
        };

        self.intents
            .lock()
            .map_err(|e| PaymentGatewayError::Transport(e.to_string()))?
            .insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, PaymentGatewayError> {
        self.intents
            .lock()
            .map_err(|e| PaymentGatewayError::Transport(e.to_string()))?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| PaymentGatewayError::NotFound(intent_id.to_string()))
    }
}

/// Notifier that remembers what it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BookingNotifier for RecordingNotifier {
    async fn notify(&self, event: &BookingEvent) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_mock_gateway_counts_calls_and_fails_on_demand() {
        let gateway = MockOrderGateway::new().with_order(ProviderOrder {
            id: "ord_1".to_string(),
            ..Default::default()
        });

        assert!(gateway.get_order("ord_1").await.is_ok());
        assert!(matches!(gateway.get_order("ord_2").await, Err(GatewayError::NotFound(_))));

        gateway.fail_with(GatewayError::Timeout);
        assert!(matches!(gateway.get_order("ord_1").await, Err(GatewayError::Timeout)));
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_payment_gateway_round_trip() {
        let gateway = MockPaymentGateway::new();
        let intent = gateway
            .create_intent(&NewPaymentIntent {
                booking_id: Uuid::new_v4(),
                booking_reference: "WF-TEST0001".to_string(),
                amount: 1000,
                currency: "EUR".to_string(),
                receipt_email: None,
            })
            .await
            .unwrap();

        assert_eq!(intent.currency, "eur");
        gateway.set_status(&intent.id, IntentStatus::Succeeded);
        let fetched = gateway.retrieve_intent(&intent.id).await.unwrap();
        assert_eq!(fetched.status, IntentStatus::Succeeded);
        assert_eq!(gateway.created(), 1);
    }
}
