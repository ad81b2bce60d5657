//! In-process [`Store`] with the same locking and visibility rules as the
//! Postgres store.
//!
//! Every row has its own async mutex standing in for `FOR UPDATE`; a unit of
//! work keeps the guards it acquired until it commits or is dropped. Writes
//! are staged on the unit of work and only become visible to other readers
//! at commit, where the partial unique rule on active bookings is enforced.
//! Booking updates are staged as column patches, so columns the unit of work
//! never wrote (the notification flags) keep their committed values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UnitOfWork};
use crate::models::{Booking, BookingStatus, Event, EventSnapshot, NotificationChannel};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const ACTIVE_BOOKING_INDEX: &str = "bookings_one_active_per_user_event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Event(Uuid),
    Booking(Uuid),
}

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    /// Entries are removed once no unit of work holds or waits on them.
    row_locks: SyncMutex<HashMap<RowKey, Arc<Mutex<()>>>>,
}

/// The columns `update_booking` writes.
#[derive(Debug, Clone)]
struct BookingPatch {
    status: BookingStatus,
    order_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl BookingPatch {
    fn apply(&self, booking: &mut Booking) {
        booking.status = self.status;
        booking.order_id = self.order_id.clone();
        booking.updated_at = self.updated_at;
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            lock_timeout,
        }
    }

    /// Seeds a catalog row. Catalog management lives outside the engine.
    pub async fn insert_event(&self, event: Event) {
        let mut tables = self.shared.tables.lock().await;
        tables.events.insert(event.id, event);
    }

    pub async fn event(&self, event_id: Uuid) -> Option<Event> {
        self.shared.tables.lock().await.events.get(&event_id).cloned()
    }

    pub async fn bookings_for_event(&self, event_id: Uuid) -> Vec<Booking> {
        let tables = self.shared.tables.lock().await;
        tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            spots: HashMap::new(),
            inserted: HashMap::new(),
            patches: HashMap::new(),
        })
    }

    async fn read_event(&self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>> {
        let tables = self.shared.tables.lock().await;
        Ok(tables.events.get(&event_id).map(EventSnapshot::from))
    }

    async fn get_booking(&self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.shared.tables.lock().await.bookings.get(&booking_id).cloned())
    }

    async fn list_user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let tables = self.shared.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn count_bookings(
        &self,
        event_id: Uuid,
        status: Option<BookingStatus>,
    ) -> StoreResult<i64> {
        let tables = self.shared.tables.lock().await;
        let count = tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id)
            .filter(|b| status.map_or(true, |s| b.status == s))
            .count();
        Ok(count as i64)
    }

    async fn sum_attendees(&self, event_id: Uuid, statuses: &[BookingStatus]) -> StoreResult<i64> {
        let tables = self.shared.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.event_id == event_id && statuses.contains(&b.status))
            .map(|b| i64::from(b.attendees))
            .sum())
    }

    async fn set_notified(
        &self,
        booking_id: Uuid,
        channel: NotificationChannel,
    ) -> StoreResult<bool> {
        // Waits behind any open unit of work on the same booking, bounded by
        // the lock timeout like every other row lock.
        let mut tx = self.begin().await?;
        tx.acquire(RowKey::Booking(booking_id)).await?;

        let mut tables = self.shared.tables.lock().await;
        let Some(booking) = tables.bookings.get_mut(&booking_id) else {
            return Ok(false);
        };
        match channel {
            NotificationChannel::Email => booking.email_notified = true,
            NotificationChannel::Whatsapp => booking.whatsapp_notified = true,
        }
        booking.updated_at = Utc::now();
        Ok(true)
    }
}

pub struct MemoryTx {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    spots: HashMap<Uuid, i32>,
    inserted: HashMap<Uuid, Booking>,
    patches: HashMap<Uuid, BookingPatch>,
}

impl MemoryTx {
    async fn acquire(&mut self, key: RowKey) -> StoreResult<()> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let lock = {
            let mut locks = self
                .shared
                .row_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key).or_default())
        };
        let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::Busy)?;
        self.held.insert(key, guard);
        Ok(())
    }

    /// The committed row as this unit of work sees it.
    fn patched(&self, committed: &Booking) -> Booking {
        let mut booking = committed.clone();
        if let Some(patch) = self.patches.get(&booking.id) {
            patch.apply(&mut booking);
        }
        booking
    }

    async fn visible_booking(&self, booking_id: Uuid) -> Option<Booking> {
        if let Some(staged) = self.inserted.get(&booking_id) {
            return Some(staged.clone());
        }
        let tables = self.shared.tables.lock().await;
        tables.bookings.get(&booking_id).map(|b| self.patched(b))
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        let keys: Vec<RowKey> = self.held.keys().copied().collect();
        self.held.clear();

        let mut locks = self
            .shared
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            // Only the map itself still points at an idle lock.
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryTx {
    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<EventSnapshot>> {
        self.acquire(RowKey::Event(event_id)).await?;
        let tables = self.shared.tables.lock().await;
        Ok(tables.events.get(&event_id).map(|event| {
            let mut snapshot = EventSnapshot::from(event);
            if let Some(spots) = self.spots.get(&event_id) {
                snapshot.available_spots = *spots;
            }
            snapshot
        }))
    }

    async fn write_available_spots(
        &mut self,
        event_id: Uuid,
        available_spots: i32,
    ) -> StoreResult<()> {
        if !self.shared.tables.lock().await.events.contains_key(&event_id) {
            return Err(StoreError::Internal(format!(
                "event {event_id} vanished while locked"
            )));
        }
        self.spots.insert(event_id, available_spots);
        Ok(())
    }

    async fn find_active_booking(
        &mut self,
        user_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Booking>> {
        let matches = |b: &Booking| {
            b.user_id == user_id && b.event_id == event_id && b.status.is_active()
        };
        if let Some(staged) = self.inserted.values().find(|b| matches(b)) {
            return Ok(Some(staged.clone()));
        }
        let tables = self.shared.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .map(|b| self.patched(b))
            .find(|b| matches(b)))
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if self.inserted.contains_key(&booking.id)
            || self.shared.tables.lock().await.bookings.contains_key(&booking.id)
        {
            return Err(StoreError::UniqueViolation("bookings_pkey".to_string()));
        }
        self.inserted.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.visible_booking(booking_id).await)
    }

    async fn lock_booking(&mut self, booking_id: Uuid) -> StoreResult<Option<Booking>> {
        self.acquire(RowKey::Booking(booking_id)).await?;
        Ok(self.visible_booking(booking_id).await)
    }

    async fn update_booking(
        &mut self,
        booking_id: Uuid,
        status: BookingStatus,
        order_id: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let patch = BookingPatch {
            status,
            order_id: order_id.map(str::to_string),
            updated_at,
        };
        if let Some(staged) = self.inserted.get_mut(&booking_id) {
            patch.apply(staged);
        } else if self.shared.tables.lock().await.bookings.contains_key(&booking_id) {
            self.patches.insert(booking_id, patch);
        }
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        let shared = Arc::clone(&self.shared);
        let mut tables = shared.tables.lock().await;

        for new in self.inserted.values() {
            let conflict = new.status.is_active()
                && tables.bookings.values().map(|b| self.patched(b)).any(|existing| {
                    existing.user_id == new.user_id
                        && existing.event_id == new.event_id
                        && existing.status.is_active()
                });
            if conflict {
                return Err(StoreError::UniqueViolation(ACTIVE_BOOKING_INDEX.to_string()));
            }
        }

        for (event_id, spots) in &self.spots {
            let capacity = tables.events.get(event_id).map(|e| e.capacity).unwrap_or(0);
            if *spots < 0 || *spots > capacity {
                return Err(StoreError::Internal(format!(
                    "check constraint events_available_spots_in_range violated for {event_id}"
                )));
            }
        }

        let now = Utc::now();
        for (event_id, spots) in std::mem::take(&mut self.spots) {
            if let Some(event) = tables.events.get_mut(&event_id) {
                event.available_spots = spots;
                event.updated_at = now;
            }
        }
        for (id, booking) in std::mem::take(&mut self.inserted) {
            tables.bookings.insert(id, booking);
        }
        for (id, patch) in std::mem::take(&mut self.patches) {
            if let Some(row) = tables.bookings.get_mut(&id) {
                patch.apply(row);
            }
        }
        drop(tables);
        Ok(())
    }
}
