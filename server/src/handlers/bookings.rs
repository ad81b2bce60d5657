//! Customer-facing booking endpoints.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CallerId};
use crate::models::BookingStatus;
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub attendees: i32,
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub spots: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttendeesQuery {
    /// Comma separated, e.g. `pending,confirmed`.
    pub statuses: Option<String>,
}

pub async fn reserve<S: Store>(
    State(state): State<AppState<S>>,
    CallerId(user_id): CallerId,
    Path(event_id): Path<Uuid>,
    Json(request): Json<ReserveRequest>,
) -> Result<Response, AppError> {
    let booking = state
        .bookings
        .reserve(user_id, event_id, request.attendees)
        .await?;
    Ok(created(booking, "Spots reserved"))
}

pub async fn check_capacity<S: Store>(
    State(state): State<AppState<S>>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<CapacityQuery>,
) -> Result<Response, AppError> {
    let check = state
        .bookings
        .check_capacity(event_id, query.spots.unwrap_or(1))
        .await?;
    Ok(success(check, "Capacity checked"))
}

pub async fn booking_count<S: Store>(
    State(state): State<AppState<S>>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<CountQuery>,
) -> Result<Response, AppError> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;
    let count = state.bookings.get_event_booking_count(event_id, status).await?;
    Ok(success(count, "Booking count"))
}

pub async fn total_attendees<S: Store>(
    State(state): State<AppState<S>>,
    Path(event_id): Path<Uuid>,
    Query(query): Query<AttendeesQuery>,
) -> Result<Response, AppError> {
    let statuses = query
        .statuses
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_status)
        .collect::<Result<Vec<_>, _>>()?;
    let total = state
        .bookings
        .get_event_total_attendees(event_id, &statuses)
        .await?;
    Ok(success(total, "Total attendees"))
}

pub async fn get_booking<S: Store>(
    State(state): State<AppState<S>>,
    CallerId(user_id): CallerId,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state.bookings.get_booking(booking_id, user_id).await?;
    Ok(success(booking, "Booking retrieved"))
}

pub async fn my_bookings<S: Store>(
    State(state): State<AppState<S>>,
    CallerId(user_id): CallerId,
) -> Result<Response, AppError> {
    let bookings = state.bookings.list_user_bookings(user_id).await?;
    Ok(success(bookings, "Bookings retrieved"))
}

pub async fn cancel<S: Store>(
    State(state): State<AppState<S>>,
    CallerId(user_id): CallerId,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let refund = state.bookings.cancel(booking_id, user_id).await?;
    Ok(success(refund, "Booking cancelled"))
}

pub(crate) fn parse_status(raw: &str) -> Result<BookingStatus, AppError> {
    raw.parse::<BookingStatus>()
        .map_err(|e| AppError::ValidationError(e.to_string()))
}
