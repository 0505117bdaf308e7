use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use wayfare_core::payment::{NewPaymentIntent, PaymentGateway, PaymentGatewayError, PaymentIntent};

use crate::app_config::PaymentProviderConfig;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

/// Payment-intent client speaking the card processor's form-encoded REST API
#[derive(Clone)]
pub struct StripePaymentGateway {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl StripePaymentGateway {
    pub fn new(cfg: &PaymentProviderConfig) -> Result<Self, PaymentGatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(cfg.timeout_ms.max(1)))
            .build()
            .map_err(|e| PaymentGatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    async fn read_intent(&self, response: reqwest::Response, intent_id: &str) -> Result<PaymentIntent, PaymentGatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<PaymentIntent>()
                .await
                .map_err(|e| PaymentGatewayError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, intent_id, &body))
    }
}

fn intent_form(request: &NewPaymentIntent) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("amount", request.amount.to_string()),
        ("currency", request.currency.to_ascii_lowercase()),
        ("automatic_payment_methods[enabled]", "true".to_string()),
        ("metadata[booking_id]", request.booking_id.to_string()),
        ("metadata[booking_reference]", request.booking_reference.clone()),
        ("description", format!("Flight booking {}", request.booking_reference)),
    ];
    if let Some(email) = &request.receipt_email {
        form.push(("receipt_email", email.clone()));
    }
    form
}

fn status_error(status: StatusCode, intent_id: &str, body: &str) -> PaymentGatewayError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message.or(e.error.code))
        .unwrap_or_else(|| status.to_string());

    if status == StatusCode::NOT_FOUND {
        PaymentGatewayError::NotFound(intent_id.to_string())
    } else if status.is_client_error() {
        PaymentGatewayError::Rejected(detail)
    } else {
        PaymentGatewayError::Transport(detail)
    }
}

fn transport_error(err: reqwest::Error) -> PaymentGatewayError {
    PaymentGatewayError::Transport(err.to_string())
}

#[async_trait]
impl PaymentGateway for StripePaymentGateway {
    async fn create_intent(&self, request: &NewPaymentIntent) -> Result<PaymentIntent, PaymentGatewayError> {
        debug!(booking_id = %request.booking_id, amount = request.amount, "Creating payment intent");

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&intent_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        let intent = self.read_intent(response, "new").await;
        if let Err(e) = &intent {
            warn!(booking_id = %request.booking_id, "Payment intent creation failed: {}", e);
        }
        intent
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentGatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.base_url, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(transport_error)?;

        self.read_intent(response, intent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wayfare_core::payment::IntentStatus;

    #[test]
    fn test_form_carries_booking_metadata() {
        let request = NewPaymentIntent {
            booking_id: Uuid::new_v4(),
            booking_reference: "WF-1A2B3C4D".to_string(),
            amount: 43120,
            currency: "GBP".to_string(),
            receipt_email: Some("traveler@example.com".to_string()),
        };

        let form = intent_form(&request);

        assert!(form.contains(&("amount", "43120".to_string())));
        assert!(form.contains(&("currency", "gbp".to_string())));
        assert!(form.contains(&("metadata[booking_reference]", "WF-1A2B3C4D".to_string())));
        assert!(form.iter().any(|(k, _)| *k == "receipt_email"));
    }

    #[test]
    fn test_intent_response_decodes() {
        let body = r#"{"id": "pi_123", "object": "payment_intent", "amount": 43120, "currency": "gbp",
                       "status": "requires_payment_method", "client_secret": "pi_123_secret_abc"}"#;
        let intent: PaymentIntent = serde_json::from_str(body).unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert!(intent.matches(43120, "GBP"));
    }

    #[test]
    fn test_error_mapping() {
        let body = r#"{"error": {"message": "No such payment_intent: 'pi_x'", "code": "resource_missing"}}"#;
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "pi_x", body),
            PaymentGatewayError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "pi_x", body),
            PaymentGatewayError::Rejected(msg) if msg.starts_with("No such payment_intent")
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "pi_x", ""),
            PaymentGatewayError::Transport(_)
        ));
    }
}
