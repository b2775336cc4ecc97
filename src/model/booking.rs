//! Booking records and their lifecycle.
//!
//! ```text
//! draft ──> pending ──> confirmed ──> in_progress ──> completed
//!   │          │            │
//!   └──────────┴────────────┴──> cancelled      confirmed ──> no_show
//! ```

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    service::{PricingUnit, Service},
    text_enum,
    user::{User, UserType},
};
use crate::error::{AppError, Result};

text_enum! {
    pub enum BookingStatus ("Stato prenotazione") {
        Draft => "draft",
        Pending => "pending",
        Confirmed => "confirmed",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

/// The role a user plays with respect to one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Client,
    Provider,
    Admin,
}

const CLIENT: &[Actor] = &[Actor::Client];
const PROVIDER: &[Actor] = &[Actor::Provider];
const EITHER: &[Actor] = &[Actor::Client, Actor::Provider];

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow)
    }

    /// Parties allowed to move a booking from `self` to `next`, or `None`
    /// when the transition does not exist. Admins are not listed; they may
    /// perform any existing transition.
    fn transition_actors(self, next: BookingStatus) -> Option<&'static [Actor]> {
        use BookingStatus::*;
        match (self, next) {
            (Draft, Pending) | (Draft, Cancelled) => Some(CLIENT),
            (Pending, Confirmed) => Some(PROVIDER),
            (Pending, Cancelled) => Some(EITHER),
            (Confirmed, InProgress) => Some(PROVIDER),
            (Confirmed, Cancelled) => Some(EITHER),
            (Confirmed, NoShow) => Some(PROVIDER),
            (InProgress, Completed) => Some(PROVIDER),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self.transition_actors(next).is_some()
    }

    pub fn next_states(self) -> Vec<BookingStatus> {
        BookingStatus::ALL
            .iter()
            .copied()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }

    /// Checks that `actor` may move a booking from `self` to `next`.
    pub fn authorize(self, next: BookingStatus, actor: Actor) -> Result<()> {
        let actors = self.transition_actors(next).ok_or_else(|| {
            AppError::Conflict(format!(
                "Impossibile passare dallo stato {} allo stato {}",
                self.label(),
                next.label()
            ))
        })?;

        if actor == Actor::Admin || actors.contains(&actor) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Non sei autorizzato a impostare la prenotazione come {}",
                next.label()
            )))
        }
    }

    /// Italian label shown to users.
    pub fn label(self) -> &'static str {
        match self {
            BookingStatus::Draft => "bozza",
            BookingStatus::Pending => "in attesa",
            BookingStatus::Confirmed => "confermata",
            BookingStatus::InProgress => "in corso",
            BookingStatus::Completed => "completata",
            BookingStatus::Cancelled => "annullata",
            BookingStatus::NoShow => "mancata presentazione",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub status: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub location_address: Option<String>,
    pub notes: Option<String>,
    pub participants: i32,
    pub total_amount: f64,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn current_status(&self) -> Result<BookingStatus> {
        self.status.parse()
    }

    /// The role `user` plays here; strangers are refused.
    pub fn actor_for(&self, user: &User) -> Result<Actor> {
        if user.is_admin() {
            Ok(Actor::Admin)
        } else if user.id == self.client_id {
            Ok(Actor::Client)
        } else if user.id == self.provider_id {
            Ok(Actor::Provider)
        } else {
            Err(AppError::Forbidden("Non hai accesso a questa prenotazione".into()))
        }
    }

    /// Who hears about a change made by `actor`.
    pub fn counterparts(&self, actor: Actor) -> Vec<Uuid> {
        match actor {
            Actor::Client => vec![self.provider_id],
            Actor::Provider => vec![self.client_id],
            Actor::Admin => vec![self.client_id, self.provider_id],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: Option<NaiveTime>,
    pub location_address: Option<String>,
    pub notes: Option<String>,
    pub participants: Option<i32>,
    /// Save as `draft` instead of sending the request.
    #[serde(default)]
    pub draft: bool,
}

impl CreateBookingRequest {
    pub fn initial_status(&self) -> BookingStatus {
        if self.draft {
            BookingStatus::Draft
        } else {
            BookingStatus::Pending
        }
    }

    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.scheduled_date < today {
            return Err(AppError::Validation(
                "La data della prenotazione non può essere nel passato".into(),
            ));
        }
        if self.notes.as_deref().is_some_and(|n| n.chars().count() > 2000) {
            return Err(AppError::Validation("Le note superano i 2000 caratteri".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub service_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Only clients book services.
pub fn ensure_can_book(user: &User) -> Result<()> {
    match user.kind()? {
        UserType::Client => Ok(()),
        _ => Err(AppError::Forbidden("Solo i clienti possono prenotare un servizio".into())),
    }
}

/// Base price, times participants for per-participant pricing, rounded
/// to cents.
pub fn compute_total_amount(service: &Service, participants: Option<i32>) -> Result<(i32, f64)> {
    if !service.is_active {
        return Err(AppError::Validation("Il servizio non è attivo".into()));
    }

    let participants = participants.unwrap_or(1);
    if participants < 1 {
        return Err(AppError::Validation("Serve almeno un partecipante".into()));
    }
    if let Some(max) = service.max_participants {
        if participants > max {
            return Err(AppError::Validation(format!(
                "Il servizio accetta al massimo {max} partecipanti"
            )));
        }
    }

    let amount = match service.pricing()? {
        PricingUnit::PerParticipant => service.base_price * participants as f64,
        PricingUnit::Fixed | PricingUnit::Hourly | PricingUnit::Daily => service.base_price,
    };
    Ok((participants, (amount * 100.0).round() / 100.0))
}
