use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::booking::BookingService;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod bookings;
pub mod internal;

/// Header carrying the caller id, set by the authentication gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

pub struct AppState<S> {
    pub bookings: Arc<BookingService<S>>,
}

impl<S> AppState<S> {
    pub fn new(bookings: BookingService<S>) -> Self {
        Self {
            bookings: Arc::new(bookings),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            bookings: Arc::clone(&self.bookings),
        }
    }
}

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub Uuid);

#[async_trait]
impl<St> FromRequestParts<St> for CallerId
where
    St: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::AuthError("missing caller identity".to_string()))?;
        raw.to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .filter(|id| !id.is_nil())
            .map(CallerId)
            .ok_or_else(|| AppError::AuthError("malformed caller identity".to_string()))
    }
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "reservation-api",
    };

    success(payload, "Health check successful")
}
