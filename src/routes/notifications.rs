use axum::{
    extract::{Extension, Json, Path, Query},
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::{AppError, Result},
    model::{
        notification::{Notification, NotificationQuery},
        Pagination,
    },
    state::AppState,
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, booking_id, read, created_at";

pub fn notifications_router() -> Router {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", patch(mark_read))
}

async fn list_notifications(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>> {
    let limit = Pagination {
        page: None,
        limit: params.limit,
    }
    .limit();

    let query = format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = $1 AND (NOT $2 OR NOT read)
         ORDER BY created_at DESC
         LIMIT $3"
    );
    let notifications = sqlx::query_as::<_, Notification>(&query)
        .bind(user.id)
        .bind(params.unread_only)
        .bind(limit)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(notifications))
}

async fn unread_count(Extension(state): Extension<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    let unread: i64 = sqlx::query("SELECT COUNT(*) AS unread FROM notifications WHERE user_id = $1 AND NOT read")
        .bind(user.id)
        .fetch_one(&state.pool)
        .await?
        .try_get("unread")?;
    Ok(Json(json!({ "unread": unread })))
}

async fn mark_read(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let query = format!(
        "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2 RETURNING {NOTIFICATION_COLUMNS}"
    );
    let notification = sqlx::query_as::<_, Notification>(&query)
        .bind(id)
        .bind(user.id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notifica non trovata".into()))?;
    Ok(Json(notification))
}

async fn mark_all_read(Extension(state): Extension<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Value>> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
        .bind(user.id)
        .execute(&state.pool)
        .await?;
    Ok(Json(json!({ "success": true, "updated": result.rows_affected() })))
}
