use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Slot not found: {0}")]
    SlotNotFound(String),

    #[error("Capacity exceeded (both turfs: {both_turfs})")]
    CapacityExceeded { both_turfs: bool },

    #[error("Duplicate booking for slot {slot_id} on {date}")]
    DuplicateBooking { slot_id: String, date: String },

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Booking {0} is not confirmed")]
    BookingNotConfirmed(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Booking {0} was cancelled")]
    BookingCancelled(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

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
            AppError::SlotNotFound(_)
            | AppError::TicketNotFound(_)
            | AppError::BookingNotFound(_) => StatusCode::NOT_FOUND,
            AppError::CapacityExceeded { .. }
            | AppError::DuplicateBooking { .. }
            | AppError::BookingCancelled(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidSignature
            | AppError::BookingNotConfirmed(_)
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::SlotNotFound(_) => "SLOT_NOT_FOUND",
            AppError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AppError::DuplicateBooking { .. } => "DUPLICATE_BOOKING",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::TicketNotFound(_) => "TICKET_NOT_FOUND",
            AppError::BookingNotConfirmed(_) => "BOOKING_NOT_CONFIRMED",
            AppError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            AppError::BookingCancelled(_) => "BOOKING_CANCELLED",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message shown to the client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::SlotNotFound(_) => "Slot not found".to_string(),
            AppError::CapacityExceeded { both_turfs: true } => {
                "Both turfs are not available".to_string()
            }
            AppError::CapacityExceeded { both_turfs: false } => "Slot is fully booked".to_string(),
            AppError::DuplicateBooking { .. } => {
                "You already have a booking for this slot".to_string()
            }
            AppError::InvalidSignature => "Payment verification failed".to_string(),
            AppError::TicketNotFound(_) => "Invalid ticket".to_string(),
            AppError::BookingNotConfirmed(_) => "Booking is not confirmed".to_string(),
            AppError::BookingNotFound(_) => "Booking not found".to_string(),
            AppError::BookingCancelled(_) => "Booking has been cancelled".to_string(),
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::ExternalServiceError(_) => "Payment service is unavailable".to_string(),
            AppError::InternalServerError(_) => "Internal server error".to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            _ => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        error_response(code, self.public_message(), None, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rejections_map_to_distinct_codes() {
        let errors = [
            AppError::SlotNotFound("s".into()),
            AppError::CapacityExceeded { both_turfs: false },
            AppError::DuplicateBooking {
                slot_id: "s".into(),
                date: "2024-01-01".into(),
            },
            AppError::InvalidSignature,
            AppError::TicketNotFound("t".into()),
            AppError::BookingNotConfirmed("b".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_capacity_message_distinguishes_both_turfs() {
        assert_eq!(
            AppError::CapacityExceeded { both_turfs: true }.public_message(),
            "Both turfs are not available"
        );
        assert_eq!(
            AppError::CapacityExceeded { both_turfs: false }.public_message(),
            "Slot is fully booked"
        );
    }

    #[test]
    fn test_database_error_hides_details() {
        let err = AppError::DatabaseError(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "A database error occurred");
    }
}
