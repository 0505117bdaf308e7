use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wayfare_booking::{LookupError, PaymentError, RegistrationError, StoreError};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    BadGateway(String),
    ServiceUnavailable(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream provider error".to_string())
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFoundError("booking not found".to_string()),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound(_) => AppError::NotFoundError("booking not found".to_string()),
            PaymentError::InvalidStatus(_)
            | PaymentError::AlreadyPaid
            | PaymentError::DeadlinePassed(_)
            | PaymentError::CancelledByProvider
            | PaymentError::ExpiredAtProvider(_)
            | PaymentError::AmountMismatch { .. } => AppError::ValidationError(err.to_string()),
            PaymentError::ProviderUnavailable(_) => AppError::ServiceUnavailable(err.to_string()),
            PaymentError::InvalidStoredAmount(_)
            | PaymentError::Gateway(_)
            | PaymentError::MissingClientSecret(_)
            | PaymentError::Store(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound => AppError::NotFoundError("booking not found".to_string()),
            LookupError::InvalidQuery(msg) => AppError::ValidationError(msg),
            LookupError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Duplicate(_) => AppError::ConflictError(err.to_string()),
            RegistrationError::OrderNotFound(_) => AppError::NotFoundError(err.to_string()),
            RegistrationError::Provider(_) => AppError::BadGateway(err.to_string()),
            RegistrationError::InvalidOrder(_) | RegistrationError::InvalidRequest(_) => {
                AppError::ValidationError(err.to_string())
            }
            RegistrationError::Store(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}
