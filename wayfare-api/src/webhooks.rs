use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use wayfare_booking::signature::SIGNATURE_HEADER;
use wayfare_booking::{SignatureError, WebhookError, WebhookEvent};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/orders", post(handle_order_webhook))
}

/// Bounded label set for metrics; provider-defined names outside it collapse
fn metric_label(event: &WebhookEvent) -> &str {
    match event {
        WebhookEvent::Unrecognized { .. } => "unrecognized",
        known => known.event_type(),
    }
}

/// POST /v1/webhooks/orders
/// Receive order lifecycle events from the flight order provider
pub async fn handle_order_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    if let Err(e) = state.verifier.verify(signature, &body) {
        state.metrics.webhook_event("unverified", "rejected");
        return Err(match e {
            SignatureError::MissingHeader | SignatureError::Malformed => {
                tracing::warn!("Webhook rejected: {}", e);
                AppError::AuthenticationError(e.to_string())
            }
            SignatureError::Mismatch | SignatureError::Stale => {
                tracing::warn!("Webhook rejected: {}", e);
                AppError::AuthorizationError("invalid webhook signature".to_string())
            }
            SignatureError::MissingSecret => AppError::InternalServerError(e.to_string()),
        });
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(WebhookError::InvalidPayload { event_type, reason }) => {
            state.metrics.webhook_event(&event_type, "invalid");
            tracing::warn!(event_type = %event_type, "Webhook payload missing required fields: {}", reason);
            return Ok(Json(json!({ "success": true })));
        }
        Err(e) => {
            state.metrics.webhook_event("unparseable", "invalid");
            tracing::warn!("Webhook payload rejected: {}", e);
            return Err(AppError::ValidationError(e.to_string()));
        }
    };

    tracing::info!(event_type = event.event_type(), order_id = ?event.order_id(), "Received order webhook");

    match state.webhooks.process(&event).await {
        Ok(outcome) => {
            state.metrics.webhook_event(metric_label(&event), outcome.as_str());
            Ok(Json(json!({ "success": true })))
        }
        Err(e) => {
            state.metrics.webhook_event(metric_label(&event), "error");
            Err(AppError::InternalServerError(e.to_string()))
        }
    }
}
