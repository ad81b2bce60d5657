//! Transactional persistence behind the booking engine.
//!
//! The engine never holds a process-wide pool. It owns a [`Store`] and opens
//! one [`UnitOfWork`] per operation. Dropping a unit of work without calling
//! [`UnitOfWork::commit`] rolls back every write made through it and releases
//! its row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, EventSnapshot, NotificationChannel};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured timeout.
    #[error("timed out waiting for a row lock")]
    Busy,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: UnitOfWork;

    /// Opens a transaction. Row locks taken through it are bounded by the
    /// store's lock timeout.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Unlocked read, for advisory answers only.
    async fn read_event(&self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>>;

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    async fn count_bookings(
        &self,
        event_id: Uuid,
        status: Option<BookingStatus>,
    ) -> StoreResult<i64>;

    async fn sum_attendees(&self, event_id: Uuid, statuses: &[BookingStatus]) -> StoreResult<i64>;

    /// Sets the channel flag. Returns `false` when the booking does not exist.
    async fn set_notified(&self, booking_id: Uuid, channel: NotificationChannel)
        -> StoreResult<bool>;
}

#[async_trait]
pub trait UnitOfWork: Send + Sized {
    /// `SELECT … FOR UPDATE` on the event row.
    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>>;

    async fn write_available_spots(&mut self, event_id: Uuid, available_spots: i32)
        -> StoreResult<()>;

    async fn find_active_booking(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Booking>>;

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    /// Unlocked read inside the transaction.
    async fn find_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    /// `SELECT … FOR UPDATE` on the booking row.
    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn update_booking(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
        order_id: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}
