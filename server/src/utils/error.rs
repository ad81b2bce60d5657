use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::booking::BookingError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

const NOT_BOOKABLE_MESSAGE: &str = "This event is not available for booking";

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

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not available: {reason}")]
    NotBookable { reason: &'static str },

    #[error("Already booked: {0}")]
    AlreadyBooked(String),

    #[error("Sold out: {message}")]
    InsufficientCapacity { message: String, available: i32 },

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Storage error")]
    StorageError(#[source] StoreError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NotBookable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyBooked(_) => StatusCode::CONFLICT,
            AppError::InsufficientCapacity { .. } => StatusCode::CONFLICT,
            AppError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::NotBookable { .. } => "NOT_BOOKABLE",
            AppError::AlreadyBooked(_) => "ALREADY_BOOKED",
            AppError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            AppError::Busy(_) => "BUSY",
            AppError::StorageError(_) => "INTERNAL_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::StorageError(e) => error!(error = ?e, "Storage error"),
            AppError::Busy(msg) => warn!(message = %msg, "Lock contention"),
            _ => debug!(error = %self, code = self.code(), "Request rejected"),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::InvalidArgument(msg) => AppError::ValidationError(msg),
            BookingError::NotFound(_) => AppError::NotFound(message),
            BookingError::InvalidState(msg) => AppError::InvalidState(msg),
            BookingError::NotBookable { reason } => AppError::NotBookable { reason },
            BookingError::AlreadyBooked => AppError::AlreadyBooked(message),
            BookingError::InsufficientCapacity { available, .. } => {
                AppError::InsufficientCapacity { message, available }
            }
            BookingError::Forbidden => AppError::Forbidden(message),
            BookingError::Busy => AppError::Busy(message),
            BookingError::StorageFailure(source) => AppError::StorageError(source),
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
        let (public_message, details) = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidState(msg)
            | AppError::AlreadyBooked(msg)
            | AppError::Busy(msg) => (msg.clone(), None),
            AppError::InsufficientCapacity { message, available } => {
                (message.clone(), Some(json!({ "available_spots": available })))
            }
            AppError::NotBookable { .. } => (NOT_BOOKABLE_MESSAGE.to_string(), None),
            AppError::StorageError(_) => ("An internal error occurred".to_string(), None),
        };

        let mut response = error_response(code, public_message, details, status);
        if matches!(self, AppError::Busy(_)) {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}
