use axum::{
    extract::{Extension, Json, Query},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::bookings::find_booking;
use crate::{
    auth::CurrentUser,
    db,
    error::{AppError, Result},
    model::{
        clean_optional,
        notification::NewNotification,
        review::{ensure_reviewable, CreateReviewRequest, RatingSummary, Review},
    },
    state::AppState,
};

const REVIEW_COLUMNS: &str = "id, booking_id, service_id, provider_id, client_id, rating, comment, created_at";

pub fn reviews_router() -> Router {
    Router::new().route("/api/reviews", get(list_reviews).post(create_review))
}

#[derive(Debug, Deserialize)]
struct ReviewQuery {
    provider_id: Option<Uuid>,
    service_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ReviewList {
    reviews: Vec<Review>,
    summary: RatingSummary,
}

async fn list_reviews(
    Extension(state): Extension<AppState>,
    Query(params): Query<ReviewQuery>,
) -> Result<Json<ReviewList>> {
    if params.provider_id.is_none() && params.service_id.is_none() {
        return Err(AppError::Validation("Indica provider_id oppure service_id".into()));
    }

    let filter = "($1::uuid IS NULL OR provider_id = $1) AND ($2::uuid IS NULL OR service_id = $2)";

    let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE {filter} ORDER BY created_at DESC");
    let reviews = sqlx::query_as::<_, Review>(&query)
        .bind(params.provider_id)
        .bind(params.service_id)
        .fetch_all(&state.pool)
        .await?;

    let query = format!(
        "SELECT AVG(rating)::float8 AS average_rating, COUNT(*) AS review_count FROM reviews WHERE {filter}"
    );
    let summary = sqlx::query_as::<_, RatingSummary>(&query)
        .bind(params.provider_id)
        .bind(params.service_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(ReviewList { reviews, summary }))
}

async fn create_review(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateReviewRequest>,
) -> Result<Json<Review>> {
    request.validate()?;
    let booking = find_booking(&state, request.booking_id).await?;
    ensure_reviewable(&booking, &user)?;

    let mut tx = state.pool.begin().await?;
    let insert = format!(
        "INSERT INTO reviews (id, booking_id, service_id, provider_id, client_id, rating, comment)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {REVIEW_COLUMNS}"
    );
    let review = sqlx::query_as::<_, Review>(&insert)
        .bind(Uuid::new_v4())
        .bind(booking.id)
        .bind(booking.service_id)
        .bind(booking.provider_id)
        .bind(user.id)
        .bind(request.rating)
        .bind(clean_optional(request.comment))
        .fetch_one(&mut tx)
        .await
        .map_err(|err| match AppError::from(err) {
            e if e.code() == "23505" => AppError::Conflict("Hai già recensito questa prenotazione".into()),
            e => e,
        })?;

    let (service_title,): (String,) = sqlx::query_as("SELECT title FROM services WHERE id = $1")
        .bind(booking.service_id)
        .fetch_one(&mut tx)
        .await?;
    let notice = NewNotification::review_received(booking.provider_id, booking.id, &service_title, review.rating);
    db::insert_notification(&mut tx, &notice).await?;
    tx.commit().await?;

    info!(review_id = %review.id, booking_id = %booking.id, rating = review.rating, "Review created");
    Ok(Json(review))
}
