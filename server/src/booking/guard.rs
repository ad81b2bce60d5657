//! Duplicate-booking guard.
//!
//! The in-transaction check runs while the event row is locked, so two
//! reservations for the same event cannot both pass it. The partial unique
//! index `bookings_one_active_per_user_event` backs it up for any path that
//! inserts without that lock; its violation maps to the same
//! [`BookingError::AlreadyBooked`].

use tracing::debug;
use uuid::Uuid;

use super::error::{BookingError, BookingOutcome};
use super::ledger::LockedEvent;
use crate::store::UnitOfWork;

pub async fn ensure_no_active_booking<T: UnitOfWork>(
    tx: &mut T,
    user_id: Uuid,
    event: &LockedEvent,
) -> BookingOutcome<()> {
    match tx.find_active_booking(user_id, event.id()).await? {
        Some(existing) => {
            debug!(
                user_id = %user_id,
                event_id = %event.id(),
                booking_id = %existing.id,
                status = %existing.status,
                "Rejected duplicate booking"
            );
            Err(BookingError::AlreadyBooked)
        }
        None => Ok(()),
    }
}
