pub mod booking;
pub mod event;

pub use booking::{
    Booking, BookingResult, BookingStatus, NotificationChannel, RefundResult, UnknownVariant,
};
pub use event::{CapacityCheck, Event, EventSnapshot, LedgerAudit};
