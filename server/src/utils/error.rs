use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::gateway::GatewayError;
use crate::models::TransitionError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Seat is already booked for this schedule")]
    SeatTaken,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Ticket has already been used")]
    AlreadyUsed,

    #[error("Ticket has already been canceled")]
    AlreadyCanceled,

    #[error("Invalid ticket state: {0}")]
    InvalidState(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment system error: {0}")]
    PaymentSystemError(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SeatTaken => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::AlreadyUsed => StatusCode::BAD_REQUEST,
            AppError::AlreadyCanceled => StatusCode::BAD_REQUEST,
            AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentDeclined(_) => StatusCode::BAD_REQUEST,
            AppError::PaymentSystemError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::SeatTaken => "SEAT_TAKEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::AlreadyUsed => "ALREADY_USED",
            AppError::AlreadyCanceled => "ALREADY_CANCELED",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            AppError::PaymentSystemError(_) => "PAYMENT_SYSTEM_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg)
            | AppError::PaymentDeclined(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::SeatTaken | AppError::AlreadyUsed | AppError::AlreadyCanceled => {
                warn!(code = self.code(), "Request rejected");
            }
            AppError::PaymentSystemError(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SeatTaken => AppError::SeatTaken,
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::DuplicateTicketNumber => {
                AppError::InternalServerError("Ticket number collision".to_string())
            }
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Declined { reason } => AppError::PaymentDeclined(reason),
            GatewayError::InvalidSignature(msg) | GatewayError::InvalidPayload(msg) => {
                AppError::ValidationError(msg)
            }
            other => AppError::PaymentSystemError(other.to_string()),
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::AlreadyUsed => AppError::AlreadyUsed,
            TransitionError::AlreadyCanceled => AppError::AlreadyCanceled,
            TransitionError::Invalid { .. } => AppError::InvalidState(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg)
            | AppError::PaymentDeclined(msg)
            | AppError::PaymentSystemError(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::SeatTaken | AppError::AlreadyUsed | AppError::AlreadyCanceled => {
                self.to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An unexpected error occurred".to_string(),
        };

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_errors_map_to_codes() {
        assert_eq!(AppError::SeatTaken.code(), "SEAT_TAKEN");
        assert_eq!(AppError::SeatTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::PaymentDeclined("card_declined".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PaymentSystemError("timeout".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_transition_errors_convert() {
        assert!(matches!(
            AppError::from(TransitionError::AlreadyUsed),
            AppError::AlreadyUsed
        ));
        assert!(matches!(
            AppError::from(TransitionError::AlreadyCanceled),
            AppError::AlreadyCanceled
        ));
    }

    #[test]
    fn test_gateway_decline_is_payment_declined() {
        let err = AppError::from(GatewayError::Declined {
            reason: "insufficient_funds".into(),
        });
        assert_eq!(err.code(), "PAYMENT_DECLINED");

        let err = AppError::from(GatewayError::Timeout);
        assert_eq!(err.code(), "PAYMENT_SYSTEM_ERROR");
    }

    #[test]
    fn test_store_seat_taken_converts() {
        assert!(matches!(AppError::from(StoreError::SeatTaken), AppError::SeatTaken));
    }
}
