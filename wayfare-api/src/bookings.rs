use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_booking::{Booking, BookingStatus, NewBooking, PublicBookingView};

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, status_lookup_rate_limit};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredBooking {
    pub booking_id: Uuid,
    pub reference: String,
    pub status: BookingStatus,
    pub pnr: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub pnr: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub outcome: &'static str,
    pub booking: Booking,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/bookings", post(register_booking))
        .route(
            "/v1/bookings/status",
            get(booking_status).route_layer(middleware::from_fn_with_state(
                state.clone(),
                status_lookup_rate_limit,
            )),
        );

    let admin = Router::new()
        .route("/v1/admin/bookings/{id}", get(admin_get_booking))
        .route("/v1/admin/bookings/{id}/sync", post(admin_sync_booking))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware));

    public.merge(admin)
}

// ============================================================================
// Public Handlers
// ============================================================================

/// POST /v1/bookings
/// Record a booking for an order that was just placed with the provider
pub async fn register_booking(
    State(state): State<AppState>,
    payload: Result<Json<NewBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisteredBooking>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e.body_text())))?;

    let booking = state.registrar.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredBooking {
            booking_id: booking.id,
            reference: booking.reference,
            status: booking.status,
            pnr: booking.pnr,
        }),
    ))
}

/// GET /v1/bookings/status?pnr=..&email=..
/// Unauthenticated lookup for the customer status page
pub async fn booking_status(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<PublicBookingView>, AppError> {
    let Query(query) = query.map_err(|_| AppError::ValidationError("pnr and email are required".to_string()))?;
    let view = state.lookup.lookup(&query.pnr, &query.email).await?;
    Ok(Json(view))
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// GET /v1/admin/bookings/{id}
pub async fn admin_get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("booking not found".to_string()))?;
    Ok(Json(booking))
}

/// POST /v1/admin/bookings/{id}/sync
/// Force a reconciliation against the provider
pub async fn admin_sync_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncResponse>, AppError> {
    let report = state
        .sync
        .reconcile_with_report(id)
        .await
        .ok_or_else(|| AppError::NotFoundError("booking not found".to_string()))?;

    state.metrics.sync_run(report.outcome.as_str());
    tracing::info!(booking_id = %id, outcome = report.outcome.as_str(), "Admin-triggered sync");

    Ok(Json(SyncResponse {
        outcome: report.outcome.as_str(),
        booking: report.booking,
    }))
}
