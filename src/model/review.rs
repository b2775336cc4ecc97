use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{
    booking::{Booking, BookingStatus},
    user::User,
};
use crate::error::{AppError, Result};

pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub service_id: Uuid,
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub booking_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
}

impl CreateReviewRequest {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(AppError::Validation("La valutazione deve essere tra 1 e 5".into()));
        }
        if self
            .comment
            .as_deref()
            .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(AppError::Validation(format!(
                "Il commento supera i {MAX_COMMENT_LEN} caratteri"
            )));
        }
        Ok(())
    }
}

/// Only the booking's client reviews, and only once the job is done.
/// Uniqueness is left to the `reviews.booking_id` constraint.
pub fn ensure_reviewable(booking: &Booking, reviewer: &User) -> Result<()> {
    if booking.client_id != reviewer.id {
        return Err(AppError::Forbidden(
            "Solo il cliente della prenotazione può lasciare una recensione".into(),
        ));
    }
    if booking.current_status()? != BookingStatus::Completed {
        return Err(AppError::Validation(
            "Puoi recensire solo prenotazioni completate".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, FromRow)]
pub struct RatingSummary {
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn booking(client: Uuid, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            client_id: client,
            provider_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            status: status.as_str().into(),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            scheduled_time: None,
            location_address: None,
            notes: None,
            participants: 1,
            total_amount: 10.0,
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn client(id: Uuid) -> User {
        User {
            id,
            email: "c@x.it".into(),
            user_type: "client".into(),
            full_name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rating_bounds() {
        for (rating, ok) in [(0, false), (1, true), (5, true), (6, false)] {
            let req = CreateReviewRequest {
                booking_id: Uuid::nil(),
                rating,
                comment: None,
            };
            assert_eq!(req.validate().is_ok(), ok, "{rating}");
        }
    }

    #[test]
    fn only_completed_bookings_by_their_client() {
        let id = Uuid::new_v4();
        assert!(ensure_reviewable(&booking(id, BookingStatus::Completed), &client(id)).is_ok());
        assert!(matches!(
            ensure_reviewable(&booking(id, BookingStatus::Confirmed), &client(id)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ensure_reviewable(&booking(id, BookingStatus::Completed), &client(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        ));
    }
}
