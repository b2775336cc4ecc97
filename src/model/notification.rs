use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{booking::BookingStatus, text_enum};

text_enum! {
    pub enum NotificationKind ("Tipo notifica") {
        BookingRequested => "booking_requested",
        BookingConfirmed => "booking_confirmed",
        BookingStarted => "booking_started",
        BookingCompleted => "booking_completed",
        BookingCancelled => "booking_cancelled",
        BookingNoShow => "booking_no_show",
        ReviewReceived => "review_received",
        System => "system",
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub booking_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub booking_id: Option<Uuid>,
}

impl NewNotification {
    /// Notice for the other party after a booking reaches `status`.
    pub fn for_booking(user_id: Uuid, booking_id: Uuid, service_title: &str, status: BookingStatus, reason: Option<&str>) -> Self {
        let (kind, title) = match status {
            BookingStatus::Pending | BookingStatus::Draft => (NotificationKind::BookingRequested, "Nuova richiesta di prenotazione"),
            BookingStatus::Confirmed => (NotificationKind::BookingConfirmed, "Prenotazione confermata"),
            BookingStatus::InProgress => (NotificationKind::BookingStarted, "Servizio iniziato"),
            BookingStatus::Completed => (NotificationKind::BookingCompleted, "Servizio completato"),
            BookingStatus::Cancelled => (NotificationKind::BookingCancelled, "Prenotazione annullata"),
            BookingStatus::NoShow => (NotificationKind::BookingNoShow, "Mancata presentazione"),
        };

        let mut message = format!(
            "La prenotazione per \"{}\" è ora {}.",
            service_title,
            status.label()
        );
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            message.push_str(&format!(" Motivo: {reason}"));
        }

        Self {
            user_id,
            kind,
            title: title.to_string(),
            message,
            booking_id: Some(booking_id),
        }
    }

    pub fn review_received(provider_id: Uuid, booking_id: Uuid, service_title: &str, rating: i16) -> Self {
        Self {
            user_id: provider_id,
            kind: NotificationKind::ReviewReceived,
            title: "Nuova recensione".to_string(),
            message: format!("Hai ricevuto una recensione da {rating}/5 per \"{service_title}\"."),
            booking_id: Some(booking_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}
