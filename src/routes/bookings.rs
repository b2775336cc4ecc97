use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, patch},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use super::services::find_service;
use crate::{
    auth::CurrentUser,
    db,
    error::{AppError, Result},
    model::{
        booking::{
            compute_total_amount, ensure_can_book, Booking, BookingQuery, BookingStatus, CreateBookingRequest,
            UpdateBookingStatusRequest,
        },
        clean_optional,
        notification::NewNotification,
        user::{User, UserType},
        ListResponse, Pagination,
    },
    state::AppState,
};

pub const BOOKING_COLUMNS: &str = "id, client_id, provider_id, service_id, status, scheduled_date, scheduled_time, \
     location_address, notes, participants, total_amount, cancellation_reason, created_at, updated_at";

pub fn bookings_router() -> Router {
    Router::new()
        .route("/api/bookings", get(list_bookings).post(create_booking))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/status", patch(update_booking_status))
}

#[derive(Debug, Serialize)]
struct BookingDetail {
    #[serde(flatten)]
    booking: Booking,
    service_title: String,
    next_states: Vec<BookingStatus>,
}

pub async fn find_booking(state: &AppState, id: Uuid) -> Result<Booking> {
    let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
    sqlx::query_as::<_, Booking>(&query)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Prenotazione non trovata".into()))
}

/// Clients see the bookings they made, providers the ones they received.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user: &User, params: &BookingQuery) -> Result<()> {
    match user.kind()? {
        UserType::Client => {
            builder.push(" AND client_id = ").push_bind(user.id);
        }
        UserType::Provider => {
            builder.push(" AND provider_id = ").push_bind(user.id);
        }
        UserType::Admin => {}
    }
    if let Some(status) = params.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(service_id) = params.service_id {
        builder.push(" AND service_id = ").push_bind(service_id);
    }
    Ok(())
}

async fn list_bookings(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<BookingQuery>,
) -> Result<Json<ListResponse<Booking>>> {
    let pagination = Pagination {
        page: params.page,
        limit: params.limit,
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM bookings WHERE TRUE");
    push_filters(&mut count, &user, &params)?;
    let total: i64 = count.build().fetch_one(&state.pool).await?.try_get("total")?;

    let mut fetch = QueryBuilder::new(format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE TRUE"));
    push_filters(&mut fetch, &user, &params)?;
    fetch
        .push(" ORDER BY scheduled_date DESC, created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let bookings = fetch.build_query_as::<Booking>().fetch_all(&state.pool).await?;

    Ok(Json(ListResponse {
        data: bookings,
        total,
        page: pagination.page(),
        limit: pagination.limit(),
    }))
}

async fn create_booking(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Booking>> {
    ensure_can_book(&user)?;
    request.validate(Utc::now().date_naive())?;

    let service = find_service(&state, request.service_id).await?;
    let (participants, total_amount) = compute_total_amount(&service, request.participants)?;
    let status = request.initial_status();

    let mut tx = state.pool.begin().await?;
    let insert = format!(
        "INSERT INTO bookings (id, client_id, provider_id, service_id, status, scheduled_date, scheduled_time,
             location_address, notes, participants, total_amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&insert)
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(service.provider_id)
        .bind(service.id)
        .bind(status.as_str())
        .bind(request.scheduled_date)
        .bind(request.scheduled_time)
        .bind(clean_optional(request.location_address.clone()))
        .bind(clean_optional(request.notes.clone()))
        .bind(participants)
        .bind(total_amount)
        .fetch_one(&mut tx)
        .await?;

    // Drafts stay private until the client submits them.
    if status == BookingStatus::Pending {
        let notice = NewNotification::for_booking(service.provider_id, booking.id, &service.title, status, None);
        db::insert_notification(&mut tx, &notice).await?;
    }
    tx.commit().await?;

    info!(
        booking_id = %booking.id,
        client_id = %user.id,
        service_id = %service.id,
        status = %status,
        total_amount,
        "Booking created"
    );
    Ok(Json(booking))
}

async fn get_booking(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetail>> {
    let booking = find_booking(&state, id).await?;
    booking.actor_for(&user)?;
    let service = find_service(&state, booking.service_id).await?;

    Ok(Json(BookingDetail {
        next_states: booking.current_status()?.next_states(),
        service_title: service.title,
        booking,
    }))
}

/// Moves a booking along its lifecycle and tells the other party.
async fn update_booking_status(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBookingStatusRequest>,
) -> Result<Json<Booking>> {
    let mut tx = state.pool.begin().await?;

    let select = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
    let booking = sqlx::query_as::<_, Booking>(&select)
        .bind(id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Prenotazione non trovata".into()))?;

    let actor = booking.actor_for(&user)?;
    let current = booking.current_status()?;
    let next = request.status;
    current.authorize(next, actor)?;

    let reason = if next == BookingStatus::Cancelled {
        clean_optional(request.cancellation_reason)
    } else {
        None
    };

    let update = format!(
        "UPDATE bookings SET
            status = $2,
            cancellation_reason = COALESCE($3, cancellation_reason),
            updated_at = NOW()
         WHERE id = $1
         RETURNING {BOOKING_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, Booking>(&update)
        .bind(id)
        .bind(next.as_str())
        .bind(reason.as_deref())
        .fetch_one(&mut tx)
        .await?;

    let (service_title,): (String,) = sqlx::query_as("SELECT title FROM services WHERE id = $1")
        .bind(updated.service_id)
        .fetch_one(&mut tx)
        .await?;
    for recipient in updated.counterparts(actor) {
        let notice = NewNotification::for_booking(recipient, updated.id, &service_title, next, reason.as_deref());
        db::insert_notification(&mut tx, &notice).await?;
    }
    tx.commit().await?;

    info!(
        booking_id = %id,
        user_id = %user.id,
        from = %current,
        to = %next,
        "Booking status changed"
    );
    Ok(Json(updated))
}
