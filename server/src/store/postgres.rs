use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::config::Config;
use crate::models::{Booking, BookingStatus, EventSnapshot, NotificationChannel};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

const BOOKING_COLUMNS: &str = "id, user_id, event_id, order_id, status, attendees, total_price, \
     whatsapp_notified, email_notified, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str = "id, capacity, available_spots, is_published, event_date, price";

/// Maps driver errors onto the kinds the engine reacts to.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut => return StoreError::Busy,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(LOCK_NOT_AVAILABLE) | Some(DEADLOCK_DETECTED) => return StoreError::Busy,
            Some(UNIQUE_VIOLATION) => {
                return StoreError::UniqueViolation(
                    db.constraint().unwrap_or("unknown").to_string(),
                )
            }
            _ => {}
        },
        _ => {}
    }
    StoreError::Database(err)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(config: &Config) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.lock_timeout * 2)
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Successfully connected to database"
        );
        Ok(Self::new(pool, config.lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Scoped to this transaction; a blocked FOR UPDATE fails with 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        Ok(PgTx { tx })
    }

    async fn read_event(&self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>> {
        sqlx::query_as::<_, EventSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn count_bookings(
        &self,
        event_id: Uuid,
        status: Option<BookingStatus>,
    ) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings \
             WHERE event_id = $1 AND ($2::booking_status IS NULL OR status = $2)",
        )
        .bind(event_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn sum_attendees(&self, event_id: Uuid, statuses: &[BookingStatus]) -> StoreResult<i64> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(attendees), 0)::BIGINT FROM bookings \
             WHERE event_id = $1 AND status::text = ANY($2)",
        )
        .bind(event_id)
        .bind(statuses)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    async fn set_notified(
        &self,
        booking_id: Uuid,
        channel: NotificationChannel,
    ) -> StoreResult<bool> {
        // Column names come from a closed enum, never from input.
        let sql = match channel {
            NotificationChannel::Email => {
                "UPDATE bookings SET email_notified = TRUE, updated_at = NOW() WHERE id = $1"
            }
            NotificationChannel::Whatsapp => {
                "UPDATE bookings SET whatsapp_notified = TRUE, updated_at = NOW() WHERE id = $1"
            }
        };
        // Inside a transaction so a held booking lock yields Busy, not a hang.
        let mut tx = self.begin().await?;
        let result = sqlx::query(sql)
            .bind(booking_id)
            .execute(&mut *tx.tx)
            .await
            .map_err(classify)?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UnitOfWork for PgTx {
    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>> {
        sqlx::query_as::<_, EventSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn write_available_spots(
        &mut self,
        event_id: Uuid,
        available_spots: i32,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE events SET available_spots = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(event_id)
        .bind(available_spots)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Internal(format!(
                "event {event_id} vanished while locked"
            )));
        }
        Ok(())
    }

    async fn find_active_booking(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE user_id = $1 AND event_id = $2 AND status <> 'cancelled' LIMIT 1"
        ))
        .bind(user_id)
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO bookings (id, user_id, event_id, order_id, status, attendees, \
             total_price, whatsapp_notified, email_notified, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.event_id)
        .bind(&booking.order_id)
        .bind(booking.status)
        .bind(booking.attendees)
        .bind(booking.total_price)
        .bind(booking.whatsapp_notified)
        .bind(booking.email_notified)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn find_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)
    }

    async fn update_booking(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
        order_id: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE bookings SET status = $2, order_id = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(booking_id)
        .bind(status)
        .bind(order_id)
        .bind(updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(classify)?;
        debug!("transaction committed");
        Ok(())
    }
}
