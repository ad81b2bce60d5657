//! Booking state machine.
//!
//! ```text
//! pending ──► confirmed ──► attended
//!    │            │
//!    └──► cancelled ◄┘
//! ```
//!
//! `cancelled` and `attended` are terminal.

use super::error::{BookingError, BookingOutcome};
use crate::models::BookingStatus;

/// Whether `from → to` is an edge of the state machine. Staying in the same
/// state is not a transition.
pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;

    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Attended)
    )
}

pub fn transition(from: BookingStatus, to: BookingStatus) -> BookingOutcome<BookingStatus> {
    if can_transition(from, to) {
        return Ok(to);
    }
    Err(match from {
        BookingStatus::Cancelled => BookingError::invalid_state("booking is already cancelled"),
        BookingStatus::Attended => BookingError::invalid_state("booking has already been attended"),
        _ => BookingError::invalid_state(format!("cannot move a {from} booking to {to}")),
    })
}

/// Whether leaving `from` for `to` hands seats back to the ledger.
pub fn releases_capacity(from: BookingStatus, to: BookingStatus) -> bool {
    from.is_active() && !to.is_active()
}
