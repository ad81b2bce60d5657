use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidState(String),

    /// The event cannot take reservations. The reason stays internal; every
    /// case reads the same to the caller.
    #[error("event is not available for booking")]
    NotBookable { reason: &'static str },

    #[error("you already have an active booking for this event")]
    AlreadyBooked,

    #[error("not enough spots available: requested {requested}, {available} left")]
    InsufficientCapacity { requested: i32, available: i32 },

    #[error("booking belongs to another user")]
    Forbidden,

    #[error("the event is busy, please retry")]
    Busy,

    #[error("storage failure")]
    StorageFailure(#[source] StoreError),
}

pub type BookingOutcome<T> = Result<T, BookingError>;

impl BookingError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BookingError::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        BookingError::InvalidState(msg.into())
    }

    /// Only lock contention may be retried without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::Busy)
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::InvalidState(_) => "INVALID_STATE",
            BookingError::NotBookable { .. } => "NOT_BOOKABLE",
            BookingError::AlreadyBooked => "ALREADY_BOOKED",
            BookingError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            BookingError::Forbidden => "FORBIDDEN",
            BookingError::Busy => "BUSY",
            BookingError::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Busy => BookingError::Busy,
            // The only secondary unique index guards active bookings.
            StoreError::UniqueViolation(ref constraint) if constraint != "bookings_pkey" => {
                BookingError::AlreadyBooked
            }
            other => {
                error!(error = ?other, "Storage failure in booking engine");
                BookingError::StorageFailure(other)
            }
        }
    }
}
