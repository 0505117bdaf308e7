use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use wayfare_core::gateway::{GatewayError, OrderGateway, ProviderOrder};

use crate::app_config::OrderGatewayConfig;

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// HTTP client for the flight order provider's REST API
#[derive(Clone)]
pub struct DuffelOrderGateway {
    http: Client,
    base_url: String,
    access_token: String,
    api_version: String,
}

impl DuffelOrderGateway {
    pub fn new(cfg: &OrderGatewayConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(cfg.timeout_ms.max(1)))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            access_token: cfg.access_token.clone(),
            api_version: cfg.api_version.clone(),
        })
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/air/orders/{}", self.base_url, order_id)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else if err.is_decode() {
        GatewayError::Decode(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn status_error(status: StatusCode, order_id: &str, body: &str) -> GatewayError {
    if status == StatusCode::NOT_FOUND {
        return GatewayError::NotFound(order_id.to_string());
    }
    let mut message: String = body.chars().take(200).collect();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("unknown").to_string();
    }
    GatewayError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl OrderGateway for DuffelOrderGateway {
    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, GatewayError> {
        debug!(order_id = %order_id, "Fetching provider order");

        let response = self
            .http
            .get(self.order_url(order_id))
            .bearer_auth(&self.access_token)
            .header("Duffel-Version", &self.api_version)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, order_id, &body));
        }

        let envelope: DataEnvelope<ProviderOrder> = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_url_ignores_trailing_slash() {
        let gateway = DuffelOrderGateway::new(&OrderGatewayConfig {
            base_url: "https://api.example.test/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(gateway.order_url("ord_1"), "https://api.example.test/air/orders/ord_1");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "ord_1", ""),
            GatewayError::NotFound(id) if id == "ord_1"
        ));
        match status_error(StatusCode::BAD_GATEWAY, "ord_1", "") {
            GatewayError::Http { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_envelope_decodes_order() {
        let body = r#"{"data": {"id": "ord_1", "booking_reference": "RZPNX8", "documents": [], "payment_status": {"awaiting_payment": true}}}"#;
        let envelope: DataEnvelope<ProviderOrder> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.id, "ord_1");
        assert!(envelope.data.payment_status.awaiting_payment);
    }
}
