//! Endpoints for payment, notification and check-in collaborators.
//!
//! Mounted under `/internal`; the gateway only exposes them to trusted
//! services.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::bookings::parse_status;
use super::AppState;
use crate::store::Store;
use crate::utils::error::AppError;
use crate::utils::response::{empty_success, success};

#[derive(Debug, Deserialize)]
pub struct AttachOrderRequest {
    pub order_id: String,
    pub status: String,
}

pub async fn attach_order<S: Store>(
    State(state): State<AppState<S>>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<AttachOrderRequest>,
) -> Result<Response, AppError> {
    let status = parse_status(&request.status)?;
    let booking = state
        .bookings
        .attach_order(booking_id, &request.order_id, status)
        .await?;
    Ok(success(booking, "Order attached"))
}

pub async fn mark_notified<S: Store>(
    State(state): State<AppState<S>>,
    Path((booking_id, channel)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    state.bookings.mark_notified(booking_id, &channel).await?;
    Ok(empty_success("Notification recorded"))
}

pub async fn mark_attended<S: Store>(
    State(state): State<AppState<S>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let booking = state.bookings.mark_attended(booking_id).await?;
    Ok(success(booking, "Attendance recorded"))
}

pub async fn staff_cancel<S: Store>(
    State(state): State<AppState<S>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let refund = state.bookings.cancel_as_staff(booking_id).await?;
    Ok(success(refund, "Booking cancelled"))
}

pub async fn audit_event<S: Store>(
    State(state): State<AppState<S>>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let audit = state.bookings.audit_event(event_id).await?;
    Ok(success(audit, "Ledger audited"))
}
