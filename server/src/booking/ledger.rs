//! Capacity ledger: the only writer of `events.available_spots`.
//!
//! A [`LockedEvent`] can only be obtained through [`lock_event`], so every
//! decrement or increment is made against a value read under the row lock
//! of the same unit of work.

use tracing::warn;
use uuid::Uuid;

use super::error::{BookingError, BookingOutcome};
use crate::models::EventSnapshot;
use crate::store::UnitOfWork;

#[derive(Debug)]
pub struct LockedEvent {
    snapshot: EventSnapshot,
}

impl LockedEvent {
    pub fn snapshot(&self) -> &EventSnapshot {
        &self.snapshot
    }

    pub fn id(&self) -> Uuid {
        self.snapshot.id
    }

    pub fn available_spots(&self) -> i32 {
        self.snapshot.available_spots
    }

    pub fn capacity(&self) -> i32 {
        self.snapshot.capacity
    }
}

pub async fn lock_event<T: UnitOfWork>(tx: &mut T, event_id: Uuid) -> BookingOutcome<LockedEvent> {
    let snapshot = tx
        .lock_event(event_id)
        .await?
        .ok_or(BookingError::NotFound("event"))?;
    Ok(LockedEvent { snapshot })
}

pub async fn decrement<T: UnitOfWork>(
    tx: &mut T,
    event: &mut LockedEvent,
    spots: i32,
) -> BookingOutcome<()> {
    if spots < 1 {
        return Err(BookingError::invalid_argument("spots must be at least 1"));
    }
    let available = event.snapshot.available_spots;
    if available < spots {
        return Err(BookingError::InsufficientCapacity {
            requested: spots,
            available,
        });
    }

    let remaining = available - spots;
    tx.write_available_spots(event.id(), remaining).await?;
    event.snapshot.available_spots = remaining;
    Ok(())
}

pub async fn increment<T: UnitOfWork>(
    tx: &mut T,
    event: &mut LockedEvent,
    spots: i32,
) -> BookingOutcome<()> {
    if spots < 1 {
        return Err(BookingError::invalid_argument("spots must be at least 1"));
    }
    let capacity = event.snapshot.capacity;
    let restored = event.snapshot.available_spots.saturating_add(spots);
    let restored = if restored > capacity {
        warn!(
            event_id = %event.id(),
            available_spots = event.snapshot.available_spots,
            spots,
            capacity,
            "Ledger increment exceeded capacity, capping"
        );
        capacity
    } else {
        restored
    };

    tx.write_available_spots(event.id(), restored).await?;
    event.snapshot.available_spots = restored;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::store::{MemoryStore, Store};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    async fn seeded(capacity: i32, available_spots: i32) -> (MemoryStore, Uuid) {
        let store = MemoryStore::default();
        let now = Utc::now();
        let id = Uuid::new_v4();
        store
            .insert_event(Event {
                id,
                slug: "ledger-test".to_string(),
                title: "Ledger test".to_string(),
                capacity,
                available_spots,
                price: Decimal::ZERO,
                event_date: now + Duration::days(1),
                is_published: true,
                created_at: now,
                updated_at: now,
            })
            .await;
        (store, id)
    }

    #[tokio::test]
    async fn test_decrement_rechecks_capacity() {
        let (store, id) = seeded(5, 2).await;
        let mut tx = store.begin().await.unwrap();
        let mut event = lock_event(&mut tx, id).await.unwrap();

        let err = decrement(&mut tx, &mut event, 3).await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::InsufficientCapacity { requested: 3, available: 2 }
        ));

        decrement(&mut tx, &mut event, 2).await.unwrap();
        assert_eq!(event.available_spots(), 0);
        tx.commit().await.unwrap();
        assert_eq!(store.event(id).await.unwrap().available_spots, 0);
    }

    #[tokio::test]
    async fn test_increment_caps_at_capacity() {
        let (store, id) = seeded(5, 4).await;
        let mut tx = store.begin().await.unwrap();
        let mut event = lock_event(&mut tx, id).await.unwrap();

        increment(&mut tx, &mut event, 3).await.unwrap();
        assert_eq!(event.available_spots(), 5);
        tx.commit().await.unwrap();
        assert_eq!(store.event(id).await.unwrap().available_spots, 5);
    }

    #[tokio::test]
    async fn test_lock_missing_event() {
        let (store, _) = seeded(1, 1).await;
        let mut tx = store.begin().await.unwrap();
        let err = lock_event(&mut tx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("event")));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_spots() {
        let (store, id) = seeded(3, 3).await;
        let mut tx = store.begin().await.unwrap();
        let mut event = lock_event(&mut tx, id).await.unwrap();
        assert!(matches!(
            decrement(&mut tx, &mut event, 0).await,
            Err(BookingError::InvalidArgument(_))
        ));
        assert!(matches!(
            increment(&mut tx, &mut event, -1).await,
            Err(BookingError::InvalidArgument(_))
        ));
    }
}
