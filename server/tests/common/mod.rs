#![allow(dead_code)]

use chrono::{Duration, Utc};
use reservation_server::booking::BookingService;
use reservation_server::models::{BookingStatus, Event};
use reservation_server::store::MemoryStore;
use rust_decimal::Decimal;
use uuid::Uuid;

pub fn upcoming_event(capacity: i32) -> Event {
    let now = Utc::now();
    let id = Uuid::new_v4();
    Event {
        id,
        slug: format!("event-{id}"),
        title: "Sourdough masterclass".to_string(),
        capacity,
        available_spots: capacity,
        price: Decimal::new(4500, 2),
        event_date: now + Duration::days(14),
        is_published: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn service_with(event: Event) -> BookingService<MemoryStore> {
    let store = MemoryStore::default();
    store.insert_event(event).await;
    BookingService::new(store)
}

pub async fn available_spots(service: &BookingService<MemoryStore>, event_id: Uuid) -> i32 {
    service
        .store()
        .event(event_id)
        .await
        .expect("event exists")
        .available_spots
}

/// Checks the capacity invariants against the committed rows.
pub async fn assert_ledger_balanced(service: &BookingService<MemoryStore>, event_id: Uuid) {
    let event = service.store().event(event_id).await.expect("event exists");
    let bookings = service.store().bookings_for_event(event_id).await;

    let reserved: i32 = bookings
        .iter()
        .filter(|b| b.status.is_active())
        .map(|b| b.attendees)
        .sum();
    assert!(event.available_spots >= 0, "available spots went negative");
    assert!(event.available_spots <= event.capacity, "available spots exceed capacity");
    assert_eq!(event.available_spots, event.capacity - reserved);

    let mut active_users: Vec<Uuid> = bookings
        .iter()
        .filter(|b| b.status.is_active())
        .map(|b| b.user_id)
        .collect();
    let before = active_users.len();
    active_users.sort();
    active_users.dedup();
    assert_eq!(before, active_users.len(), "a user holds two active bookings");

    let audit = service.audit_event(event_id).await.expect("audit");
    assert!(audit.consistent);
    assert_eq!(
        service
            .get_event_total_attendees(event_id, BookingStatus::ACTIVE)
            .await
            .expect("sum"),
        i64::from(reserved)
    );
}
