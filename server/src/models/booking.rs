use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Attended,
}

impl BookingStatus {
    /// Statuses whose attendees hold seats against the event capacity.
    pub const ACTIVE: &'static [BookingStatus] = &[
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Attended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Attended => "attended",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Attended)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            "attended" => Ok(BookingStatus::Attended),
            _ => Err(UnknownVariant {
                kind: "booking status",
                value: s.to_string(),
            }),
        }
    }
}

/// Customer notification channels that carry a write-once flag on the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Whatsapp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Whatsapp => "whatsapp",
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationChannel::Email),
            "whatsapp" => Ok(NotificationChannel::Whatsapp),
            _ => Err(UnknownVariant {
                kind: "notification channel",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub order_id: Option<String>,
    pub status: BookingStatus,
    pub attendees: i32,
    pub total_price: Decimal,
    pub whatsapp_notified: bool,
    pub email_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A fresh pending booking priced at `attendees × unit_price`.
    pub fn pending(user_id: Uuid, event_id: Uuid, attendees: i32, unit_price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            event_id,
            order_id: None,
            status: BookingStatus::Pending,
            attendees,
            total_price: unit_price * Decimal::from(attendees),
            whatsapp_notified: false,
            email_notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_notified(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::Email => self.email_notified,
            NotificationChannel::Whatsapp => self.whatsapp_notified,
        }
    }
}

/// Returned to the caller of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResult {
    pub booking_id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub attendees: i32,
    pub total_price: Decimal,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingResult {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            event_id: booking.event_id,
            user_id: booking.user_id,
            attendees: booking.attendees,
            total_price: booking.total_price,
            status: booking.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub booking_id: Uuid,
    pub refunded_spots: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_booking_freezes_total_price() {
        let booking = Booking::pending(Uuid::new_v4(), Uuid::new_v4(), 3, Decimal::new(2550, 2));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price, Decimal::new(7650, 2));
        assert!(booking.order_id.is_none());
        assert!(!booking.email_notified && !booking.whatsapp_notified);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Confirmed".parse::<BookingStatus>(), Ok(BookingStatus::Confirmed));
        assert_eq!("canceled".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert!("refunded".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_active_sets() {
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Attended.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::ACTIVE.iter().all(BookingStatus::is_active));
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("email".parse::<NotificationChannel>(), Ok(NotificationChannel::Email));
        assert_eq!(" WhatsApp ".parse::<NotificationChannel>(), Ok(NotificationChannel::Whatsapp));
        let err = "sms".parse::<NotificationChannel>().unwrap_err();
        assert_eq!(err.to_string(), "unknown notification channel 'sms'");
    }
}
