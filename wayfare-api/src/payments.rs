use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use wayfare_booking::PaymentError;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub booking_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/intent", post(create_payment_intent))
}

fn outcome_label(err: &PaymentError) -> &'static str {
    match err {
        PaymentError::NotFound(_) => "not_found",
        PaymentError::InvalidStatus(_) | PaymentError::AlreadyPaid => "rejected_status",
        PaymentError::DeadlinePassed(_) | PaymentError::ExpiredAtProvider(_) => "rejected_expired",
        PaymentError::CancelledByProvider => "rejected_cancelled",
        PaymentError::AmountMismatch { .. } => "rejected_amount",
        PaymentError::ProviderUnavailable(_) => "provider_unavailable",
        _ => "error",
    }
}

/// POST /v1/payments/intent
/// Open (or reuse) a payment intent for a booking and hand back its client secret
pub async fn create_payment_intent(
    State(state): State<AppState>,
    payload: Result<Json<PaymentIntentRequest>, JsonRejection>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e.body_text())))?;

    if req.booking_id.trim().is_empty() {
        return Err(AppError::ValidationError("bookingId is required".to_string()));
    }

    match state.payments.prepare_checkout(&req.booking_id).await {
        Ok(session) => {
            state
                .metrics
                .payment_intent(if session.reused { "reused" } else { "created" });
            Ok(Json(PaymentIntentResponse {
                client_secret: session.client_secret,
            }))
        }
        Err(e) => {
            state.metrics.payment_intent(outcome_label(&e));
            tracing::info!(booking = %req.booking_id, "Payment intent refused: {}", e);
            Err(e.into())
        }
    }
}
