//! Event capacity reservation engine.

pub mod error;
pub mod guard;
pub mod ledger;
pub mod lifecycle;
pub mod service;

pub use error::{BookingError, BookingOutcome};
pub use service::BookingService;
