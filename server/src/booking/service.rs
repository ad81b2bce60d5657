use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::error::{BookingError, BookingOutcome};
use super::{guard, ledger, lifecycle};
use crate::models::{
    Booking, BookingResult, BookingStatus, CapacityCheck, LedgerAudit, NotificationChannel,
    RefundResult, UnknownVariant,
};
use crate::store::{Store, UnitOfWork};

const UNPUBLISHED: &str = "event is not published";
const PAST_EVENT: &str = "event date has passed";

/// Entry point for every capacity-affecting operation.
///
/// Each method opens its own unit of work on the store. When a method needs
/// both an event row and a booking row it locks the event first, so that
/// reservations and cancellations on the same event cannot deadlock.
pub struct BookingService<S> {
    store: S,
}

impl<S: Store> BookingService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reserves `attendees` seats for `user_id` as a pending booking.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        attendees: i32,
    ) -> BookingOutcome<BookingResult> {
        require_id(user_id, "user_id")?;
        require_id(event_id, "event_id")?;
        if attendees < 1 {
            return Err(BookingError::invalid_argument("attendees must be at least 1"));
        }

        let mut tx = self.store.begin().await?;
        let mut event = ledger::lock_event(&mut tx, event_id).await?;
        let snapshot = *event.snapshot();

        if !snapshot.is_published {
            return Err(BookingError::NotBookable { reason: UNPUBLISHED });
        }
        if snapshot.event_date <= Utc::now() {
            return Err(BookingError::NotBookable { reason: PAST_EVENT });
        }

        guard::ensure_no_active_booking(&mut tx, user_id, &event).await?;

        if event.available_spots() < attendees {
            debug!(
                available_spots = event.available_spots(),
                "Rejected reservation for lack of capacity"
            );
            return Err(BookingError::InsufficientCapacity {
                requested: attendees,
                available: event.available_spots(),
            });
        }

        let booking = Booking::pending(user_id, event_id, attendees, snapshot.price);
        tx.insert_booking(&booking).await?;
        ledger::decrement(&mut tx, &mut event, attendees).await?;
        tx.commit().await?;

        info!(
            booking_id = %booking.id,
            available_spots = event.available_spots(),
            "Reserved spots"
        );
        Ok(BookingResult::from(&booking))
    }

    /// Cancels the caller's own booking and returns its seats to the event.
    #[instrument(skip(self))]
    pub async fn cancel(&self, booking_id: Uuid, user_id: Uuid) -> BookingOutcome<RefundResult> {
        require_id(user_id, "user_id")?;
        self.cancel_booking(booking_id, Some(user_id)).await
    }

    /// Cancellation on behalf of an operator; skips the ownership check.
    #[instrument(skip(self))]
    pub async fn cancel_as_staff(&self, booking_id: Uuid) -> BookingOutcome<RefundResult> {
        self.cancel_booking(booking_id, None).await
    }

    async fn cancel_booking(
        &self,
        booking_id: Uuid,
        requester: Option<Uuid>,
    ) -> BookingOutcome<RefundResult> {
        let mut tx = self.store.begin().await?;

        // event_id never changes, so an unlocked read tells us which event
        // row to lock before the booking row.
        let located = tx
            .find_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        authorize(&located, requester)?;

        let mut event = ledger::lock_event(&mut tx, located.event_id).await?;
        let booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;

        let next = lifecycle::transition(booking.status, BookingStatus::Cancelled)?;
        tx.update_booking(booking.id, next, booking.order_id.as_deref(), Utc::now())
            .await?;
        if lifecycle::releases_capacity(booking.status, next) {
            ledger::increment(&mut tx, &mut event, booking.attendees).await?;
        }
        tx.commit().await?;

        info!(
            event_id = %event.id(),
            refunded_spots = booking.attendees,
            available_spots = event.available_spots(),
            "Cancelled booking"
        );
        Ok(RefundResult {
            booking_id: booking.id,
            refunded_spots: booking.attendees,
        })
    }

    /// Links a payment order to the booking and moves it to `status`.
    ///
    /// Redelivering the same `(order_id, status)` is a successful no-op.
    /// Seats were taken at reservation time, so the ledger is not involved.
    #[instrument(skip(self))]
    pub async fn attach_order(
        &self,
        booking_id: Uuid,
        order_id: &str,
        status: BookingStatus,
    ) -> BookingOutcome<Booking> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(BookingError::invalid_argument("order_id is required"));
        }
        if !matches!(status, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(BookingError::invalid_argument(format!(
                "order linkage cannot set status {status}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;

        if booking.order_id.as_deref() == Some(order_id) && booking.status == status {
            debug!("Order already attached");
            return Ok(booking);
        }
        if booking.status == BookingStatus::Confirmed
            && booking.order_id.as_deref().is_some_and(|current| current != order_id)
        {
            return Err(BookingError::invalid_state(
                "booking is already confirmed under another order",
            ));
        }

        let next = if booking.status == status {
            status
        } else {
            lifecycle::transition(booking.status, status)?
        };
        let now = Utc::now();
        tx.update_booking(booking.id, next, Some(order_id), now).await?;
        tx.commit().await?;

        info!(status = %next, "Attached order to booking");
        Ok(Booking {
            status: next,
            order_id: Some(order_id.to_string()),
            updated_at: now,
            ..booking
        })
    }

    /// Check-in: `confirmed → attended`. Seats stay taken.
    #[instrument(skip(self))]
    pub async fn mark_attended(&self, booking_id: Uuid) -> BookingOutcome<Booking> {
        let mut tx = self.store.begin().await?;
        let booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;

        let next = lifecycle::transition(booking.status, BookingStatus::Attended)?;
        let now = Utc::now();
        tx.update_booking(booking.id, next, booking.order_id.as_deref(), now)
            .await?;
        tx.commit().await?;

        Ok(Booking {
            status: next,
            updated_at: now,
            ..booking
        })
    }

    /// Advisory answer; the authoritative check happens inside `reserve`.
    pub async fn check_capacity(
        &self,
        event_id: Uuid,
        requested_spots: i32,
    ) -> BookingOutcome<CapacityCheck> {
        require_id(event_id, "event_id")?;
        if requested_spots < 1 {
            return Err(BookingError::invalid_argument("requested spots must be at least 1"));
        }
        let event = self
            .store
            .read_event(event_id)
            .await?
            .ok_or(BookingError::NotFound("event"))?;

        Ok(CapacityCheck {
            available: event.available_spots >= requested_spots,
            available_spots: event.available_spots,
            capacity: event.capacity,
        })
    }

    /// Records that `channel` fired for the booking. Setting it twice is fine.
    #[instrument(skip(self))]
    pub async fn mark_notified(&self, booking_id: Uuid, channel: &str) -> BookingOutcome<()> {
        let channel: NotificationChannel = channel
            .parse()
            .map_err(|e: UnknownVariant| BookingError::invalid_argument(e.to_string()))?;

        if !self.store.set_notified(booking_id, channel).await? {
            return Err(BookingError::NotFound("booking"));
        }
        debug!(channel = channel.as_str(), "Marked booking notified");
        Ok(())
    }

    pub async fn get_event_booking_count(
        &self,
        event_id: Uuid,
        status: Option<BookingStatus>,
    ) -> BookingOutcome<i64> {
        Ok(self.store.count_bookings(event_id, status).await?)
    }

    /// Sums attendees over `statuses`, or over the seat-holding statuses when
    /// none are given.
    pub async fn get_event_total_attendees(
        &self,
        event_id: Uuid,
        statuses: &[BookingStatus],
    ) -> BookingOutcome<i64> {
        let statuses = if statuses.is_empty() {
            BookingStatus::ACTIVE
        } else {
            statuses
        };
        Ok(self.store.sum_attendees(event_id, statuses).await?)
    }

    pub async fn get_booking(&self, booking_id: Uuid, user_id: Uuid) -> BookingOutcome<Booking> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("booking"))?;
        authorize(&booking, Some(user_id))?;
        Ok(booking)
    }

    pub async fn list_user_bookings(&self, user_id: Uuid) -> BookingOutcome<Vec<Booking>> {
        require_id(user_id, "user_id")?;
        Ok(self.store.list_user_bookings(user_id).await?)
    }

    /// Recomputes `capacity - Σ active attendees` against the stored counter.
    ///
    /// Holding the event lock freezes every change that could move either
    /// side of the equation.
    #[instrument(skip(self))]
    pub async fn audit_event(&self, event_id: Uuid) -> BookingOutcome<LedgerAudit> {
        let mut tx = self.store.begin().await?;
        let event = ledger::lock_event(&mut tx, event_id).await?;
        let reserved = self
            .store
            .sum_attendees(event_id, BookingStatus::ACTIVE)
            .await?;
        drop(tx);

        let audit = LedgerAudit::new(event.snapshot(), reserved);
        if !audit.consistent {
            tracing::error!(?audit, "Capacity ledger out of balance");
        }
        Ok(audit)
    }
}

fn require_id(id: Uuid, name: &str) -> BookingOutcome<()> {
    if id.is_nil() {
        return Err(BookingError::invalid_argument(format!("{name} is required")));
    }
    Ok(())
}

fn authorize(booking: &Booking, requester: Option<Uuid>) -> BookingOutcome<()> {
    match requester {
        Some(user_id) if booking.user_id != user_id => Err(BookingError::Forbidden),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use rust_decimal::Decimal;

    async fn service_with_event(
        capacity: i32,
        published: bool,
        days_ahead: i64,
    ) -> (BookingService<MemoryStore>, Uuid) {
        let store = MemoryStore::default();
        let now = Utc::now();
        let id = Uuid::new_v4();
        store
            .insert_event(Event {
                id,
                slug: format!("event-{id}"),
                title: "Pottery night".to_string(),
                capacity,
                available_spots: capacity,
                price: Decimal::new(2500, 2),
                event_date: now + Duration::days(days_ahead),
                is_published: published,
                created_at: now,
                updated_at: now,
            })
            .await;
        (BookingService::new(store), id)
    }

    async fn available(service: &BookingService<MemoryStore>, event_id: Uuid) -> i32 {
        service.store().event(event_id).await.unwrap().available_spots
    }

    #[tokio::test]
    async fn test_reserve_creates_pending_booking_and_takes_spots() {
        let (service, event_id) = service_with_event(10, true, 3).await;
        let user = Uuid::new_v4();

        let result = service.reserve(user, event_id, 4).await.unwrap();
        assert_eq!(result.status, BookingStatus::Pending);
        assert_eq!(result.attendees, 4);
        assert_eq!(result.total_price, Decimal::new(10000, 2));
        assert_eq!(available(&service, event_id).await, 6);
    }

    #[tokio::test]
    async fn test_reserve_validates_arguments() {
        let (service, event_id) = service_with_event(10, true, 3).await;
        for (user, event, attendees) in [
            (Uuid::nil(), event_id, 1),
            (Uuid::new_v4(), Uuid::nil(), 1),
            (Uuid::new_v4(), event_id, 0),
        ] {
            let err = service.reserve(user, event, attendees).await.unwrap_err();
            assert!(matches!(err, BookingError::InvalidArgument(_)));
        }
        assert_eq!(available(&service, event_id).await, 10);
    }

    #[tokio::test]
    async fn test_reserve_rejects_unpublished_and_past_events() {
        let (service, draft) = service_with_event(10, false, 3).await;
        let err = service.reserve(Uuid::new_v4(), draft, 1).await.unwrap_err();
        assert!(matches!(err, BookingError::NotBookable { reason: UNPUBLISHED }));

        let (service, past) = service_with_event(10, true, -1).await;
        let err = service.reserve(Uuid::new_v4(), past, 1).await.unwrap_err();
        assert!(matches!(err, BookingError::NotBookable { reason: PAST_EVENT }));
        assert_eq!(available(&service, past).await, 10);
    }

    #[tokio::test]
    async fn test_reserve_unknown_event() {
        let (service, _) = service_with_event(10, true, 3).await;
        let err = service.reserve(Uuid::new_v4(), Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("event")));
    }

    #[tokio::test]
    async fn test_cancel_requires_owner() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let owner = Uuid::new_v4();
        let booking = service.reserve(owner, event_id, 2).await.unwrap();

        let err = service.cancel(booking.booking_id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden));
        assert_eq!(available(&service, event_id).await, 3);

        let refund = service.cancel(booking.booking_id, owner).await.unwrap();
        assert_eq!(refund.refunded_spots, 2);
        assert_eq!(available(&service, event_id).await, 5);
    }

    #[tokio::test]
    async fn test_cancel_unknown_booking() {
        let (service, _) = service_with_event(5, true, 3).await;
        let err = service.cancel(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("booking")));
    }

    #[tokio::test]
    async fn test_rebooking_after_cancel_creates_new_row() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let user = Uuid::new_v4();
        let first = service.reserve(user, event_id, 2).await.unwrap();
        service.cancel(first.booking_id, user).await.unwrap();

        let second = service.reserve(user, event_id, 1).await.unwrap();
        assert_ne!(first.booking_id, second.booking_id);
        assert_eq!(service.store().bookings_for_event(event_id).await.len(), 2);
        assert_eq!(available(&service, event_id).await, 4);
    }

    #[tokio::test]
    async fn test_attach_order_is_idempotent() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let user = Uuid::new_v4();
        let booking = service.reserve(user, event_id, 1).await.unwrap();

        let first = service
            .attach_order(booking.booking_id, "ord_1", BookingStatus::Confirmed)
            .await
            .unwrap();
        let second = service
            .attach_order(booking.booking_id, "ord_1", BookingStatus::Confirmed)
            .await
            .unwrap();

        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(second, service.store().get_booking(booking.booking_id).await.unwrap().unwrap());
        assert_eq!(second.updated_at, first.updated_at);
        assert_eq!(available(&service, event_id).await, 4);
    }

    #[tokio::test]
    async fn test_attach_order_rules() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let user = Uuid::new_v4();
        let booking = service.reserve(user, event_id, 1).await.unwrap();

        let err = service
            .attach_order(booking.booking_id, "ord_1", BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));

        let pending = service
            .attach_order(booking.booking_id, "cs_1", BookingStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.order_id.as_deref(), Some("cs_1"));

        service
            .attach_order(booking.booking_id, "ord_1", BookingStatus::Confirmed)
            .await
            .unwrap();
        let err = service
            .attach_order(booking.booking_id, "ord_2", BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));

        service.cancel(booking.booking_id, user).await.unwrap();
        let err = service
            .attach_order(booking.booking_id, "ord_1", BookingStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));

        let err = service
            .attach_order(Uuid::new_v4(), "ord_1", BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound("booking")));
    }

    #[tokio::test]
    async fn test_mark_attended_keeps_spots() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let user = Uuid::new_v4();
        let booking = service.reserve(user, event_id, 2).await.unwrap();

        let err = service.mark_attended(booking.booking_id).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));

        service
            .attach_order(booking.booking_id, "ord_9", BookingStatus::Confirmed)
            .await
            .unwrap();
        let attended = service.mark_attended(booking.booking_id).await.unwrap();
        assert_eq!(attended.status, BookingStatus::Attended);
        assert_eq!(available(&service, event_id).await, 3);

        let err = service.cancel(booking.booking_id, user).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidState(_)));
        assert_eq!(available(&service, event_id).await, 3);
    }

    #[tokio::test]
    async fn test_mark_notified() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        let booking = service.reserve(Uuid::new_v4(), event_id, 1).await.unwrap();

        service.mark_notified(booking.booking_id, "email").await.unwrap();
        service.mark_notified(booking.booking_id, "email").await.unwrap();
        let stored = service.store().get_booking(booking.booking_id).await.unwrap().unwrap();
        assert!(stored.is_notified(NotificationChannel::Email));
        assert!(!stored.is_notified(NotificationChannel::Whatsapp));

        let err = service.mark_notified(booking.booking_id, "pigeon").await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidArgument(_)));
        let err = service.mark_notified(Uuid::new_v4(), "whatsapp").await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound("booking")));
    }

    #[tokio::test]
    async fn test_check_capacity() {
        let (service, event_id) = service_with_event(5, true, 3).await;
        service.reserve(Uuid::new_v4(), event_id, 3).await.unwrap();

        let check = service.check_capacity(event_id, 2).await.unwrap();
        assert_eq!(
            check,
            CapacityCheck { available: true, available_spots: 2, capacity: 5 }
        );
        assert!(!service.check_capacity(event_id, 3).await.unwrap().available);
        assert!(matches!(
            service.check_capacity(event_id, 0).await,
            Err(BookingError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.check_capacity(Uuid::new_v4(), 1).await,
            Err(BookingError::NotFound("event"))
        ));
    }

    #[tokio::test]
    async fn test_counts_and_audit() {
        let (service, event_id) = service_with_event(10, true, 3).await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let first = service.reserve(a, event_id, 3).await.unwrap();
        service.reserve(b, event_id, 2).await.unwrap();
        service.cancel(first.booking_id, a).await.unwrap();

        assert_eq!(service.get_event_booking_count(event_id, None).await.unwrap(), 2);
        assert_eq!(
            service
                .get_event_booking_count(event_id, Some(BookingStatus::Cancelled))
                .await
                .unwrap(),
            1
        );
        assert_eq!(service.get_event_total_attendees(event_id, &[]).await.unwrap(), 2);
        assert_eq!(
            service
                .get_event_total_attendees(event_id, &[BookingStatus::Cancelled])
                .await
                .unwrap(),
            3
        );
        assert_eq!(service.get_event_booking_count(Uuid::new_v4(), None).await.unwrap(), 0);

        let audit = service.audit_event(event_id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.available_spots, 8);
        assert_eq!(audit.reserved_spots, 2);
    }

    #[tokio::test]
    async fn test_get_booking_checks_owner() {
        let (service, event_id) = service_with_event(10, true, 3).await;
        let user = Uuid::new_v4();
        let booking = service.reserve(user, event_id, 1).await.unwrap();

        let fetched = service.get_booking(booking.booking_id, user).await.unwrap();
        assert_eq!(fetched.id, booking.booking_id);
        assert!(matches!(
            service.get_booking(booking.booking_id, Uuid::new_v4()).await,
            Err(BookingError::Forbidden)
        ));
        assert_eq!(service.list_user_bookings(user).await.unwrap().len(), 1);
    }
}
