use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A capacity-bearing event as stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub capacity: i32,
    pub available_spots: i32,
    pub price: Decimal,
    pub event_date: DateTime<Utc>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The columns a booking decision is allowed to depend on.
///
/// A snapshot read under a row lock is the only valid input to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, FromRow)]
pub struct EventSnapshot {
    pub id: Uuid,
    pub capacity: i32,
    pub available_spots: i32,
    pub is_published: bool,
    pub event_date: DateTime<Utc>,
    pub price: Decimal,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            capacity: event.capacity,
            available_spots: event.available_spots,
            is_published: event.is_published,
            event_date: event.event_date,
            price: event.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityCheck {
    pub available: bool,
    pub available_spots: i32,
    pub capacity: i32,
}

/// Result of recomputing the capacity invariant for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub event_id: Uuid,
    pub capacity: i32,
    pub available_spots: i32,
    pub reserved_spots: i64,
    pub consistent: bool,
}

impl LedgerAudit {
    pub fn new(snapshot: &EventSnapshot, reserved_spots: i64) -> Self {
        let expected = i64::from(snapshot.capacity) - reserved_spots;
        Self {
            event_id: snapshot.id,
            capacity: snapshot.capacity,
            available_spots: snapshot.available_spots,
            reserved_spots,
            consistent: expected == i64::from(snapshot.available_spots)
                && snapshot.available_spots >= 0
                && snapshot.available_spots <= snapshot.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(capacity: i32, available_spots: i32) -> EventSnapshot {
        EventSnapshot {
            id: Uuid::new_v4(),
            capacity,
            available_spots,
            is_published: true,
            event_date: Utc::now(),
            price: Decimal::ZERO,
        }
    }

    #[test]
    fn test_audit_consistent_when_reserved_matches() {
        let audit = LedgerAudit::new(&snapshot(10, 6), 4);
        assert!(audit.consistent);
        assert_eq!(audit.reserved_spots, 4);
    }

    #[test]
    fn test_audit_flags_drift() {
        assert!(!LedgerAudit::new(&snapshot(10, 6), 3).consistent);
        assert!(!LedgerAudit::new(&snapshot(10, 11), -1).consistent);
    }
}
