use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{bookings, health_check, internal, AppState};
use crate::store::Store;

pub fn create_routes<S: Store>(state: AppState<S>, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events/:event_id/bookings", post(bookings::reserve::<S>))
        .route("/events/:event_id/capacity", get(bookings::check_capacity::<S>))
        .route("/events/:event_id/bookings/count", get(bookings::booking_count::<S>))
        .route("/events/:event_id/attendees", get(bookings::total_attendees::<S>))
        .route("/users/me/bookings", get(bookings::my_bookings::<S>))
        .route("/bookings/:booking_id", get(bookings::get_booking::<S>))
        .route("/bookings/:booking_id/cancel", post(bookings::cancel::<S>))
        .nest("/internal", internal_routes::<S>())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config))
        .layer(create_cors_layer(&config.allowed_origins))
}

fn internal_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/bookings/:booking_id/order", put(internal::attach_order::<S>))
        .route(
            "/bookings/:booking_id/notifications/:channel",
            post(internal::mark_notified::<S>),
        )
        .route("/bookings/:booking_id/attend", post(internal::mark_attended::<S>))
        .route("/bookings/:booking_id/cancel", post(internal::staff_cancel::<S>))
        .route("/events/:event_id/audit", get(internal::audit_event::<S>))
}
