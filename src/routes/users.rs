use axum::{
    extract::{Extension, Json, Path},
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{find_user, AuthUser, CurrentUser},
    db,
    error::{AppError, Result},
    model::{
        clean_optional,
        user::{SyncUserRequest, UpdateUserRequest, User, UserType},
    },
    state::AppState,
};

const USER_COLUMNS: &str = "id, email, user_type, full_name, created_at";

pub fn users_router() -> Router {
    Router::new()
        .route("/sync", post(sync_user)) // POST /api/users/sync
        .route("/me", get(get_me).put(update_me)) // GET|PUT /api/users/me
        .route("/:id", get(get_user)) // GET /api/users/{id}
}

/// Creates the `users` row for a freshly signed-up Supabase account,
/// together with its empty profile. Safe to call again.
async fn sync_user(
    Extension(state): Extension<AppState>,
    AuthUser(identity): AuthUser,
    Json(request): Json<SyncUserRequest>,
) -> Result<Json<User>> {
    if request.user_type == UserType::Admin {
        return Err(AppError::Forbidden("Il ruolo amministratore non può essere auto-assegnato".into()));
    }
    let email = identity
        .email
        .clone()
        .ok_or_else(|| AppError::Validation("L'account non ha un indirizzo email".into()))?;

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, user_type, full_name) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(identity.id)
    .bind(&email)
    .bind(request.user_type.as_str())
    .bind(clean_optional(request.full_name))
    .execute(&mut tx)
    .await?;

    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let user = sqlx::query_as::<_, User>(&query)
        .bind(identity.id)
        .fetch_one(&mut tx)
        .await?;

    // The stored type wins over the request on repeated syncs.
    db::ensure_profile(&mut tx, user.id, user.kind()?).await?;
    tx.commit().await?;

    info!(user_id = %user.id, user_type = %user.user_type, "User synced");
    Ok(Json(user))
}

async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

async fn update_me(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>> {
    let query = format!(
        "UPDATE users SET full_name = COALESCE($2, full_name) WHERE id = $1 RETURNING {USER_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, User>(&query)
        .bind(user.id)
        .bind(clean_optional(request.full_name))
        .fetch_one(&state.pool)
        .await?;
    Ok(Json(updated))
}

async fn get_user(
    Extension(state): Extension<AppState>,
    CurrentUser(current): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    if current.id != id && !current.is_admin() {
        return Err(AppError::Forbidden("Non puoi vedere i dati di altri utenti".into()));
    }
    let user = find_user(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Utente non trovato".into()))?;
    Ok(Json(user))
}
