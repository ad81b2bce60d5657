//! Capacity-limited event booking service.
//!
//! [`booking::BookingService`] holds the reservation engine; [`store`]
//! provides the Postgres and in-memory units of work it runs on; the
//! [`routes`] module exposes it over HTTP.

pub mod booking;
pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod utils;
