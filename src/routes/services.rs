use axum::{
    extract::{Extension, Json, Path, Query},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    db,
    error::{AppError, Result},
    model::{
        clean_optional,
        service::{normalize_areas, CreateServiceRequest, Service, ServiceQuery, UpdateServiceRequest},
        user::{User, UserType},
        ListResponse,
    },
    state::AppState,
};

pub const SERVICE_COLUMNS: &str = "id, provider_id, title, description, category, pricing_unit, base_price, \
     location_type, duration_hours, max_participants, service_areas, image_url, is_active, created_at, updated_at";

pub fn services_router() -> Router {
    Router::new()
        .route("/api/services", get(list_services).post(create_service))
        .route(
            "/api/services/:id",
            get(get_service).put(update_service).delete(delete_service),
        )
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ServiceQuery) {
    if !params.include_inactive.unwrap_or(false) {
        builder.push(" AND is_active");
    }
    if let Some(category) = params.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(location_type) = params.location_type {
        builder.push(" AND location_type = ").push_bind(location_type.as_str());
    }
    if let Some(provider_id) = params.provider_id {
        builder.push(" AND provider_id = ").push_bind(provider_id);
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{q}%");
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(area) = params.area.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        builder
            .push(" AND EXISTS (SELECT 1 FROM unnest(service_areas) AS area WHERE lower(area) = lower(")
            .push_bind(area.to_string())
            .push("))");
    }
    if let Some(min_price) = params.min_price {
        builder.push(" AND base_price >= ").push_bind(min_price);
    }
    if let Some(max_price) = params.max_price {
        builder.push(" AND base_price <= ").push_bind(max_price);
    }
}

async fn list_services(
    Extension(state): Extension<AppState>,
    Query(params): Query<ServiceQuery>,
) -> Result<Json<ListResponse<Service>>> {
    let pagination = params.pagination();

    let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM services WHERE TRUE");
    push_filters(&mut count, &params);
    let total: i64 = count.build().fetch_one(&state.pool).await?.try_get("total")?;

    let mut fetch = QueryBuilder::new(format!("SELECT {SERVICE_COLUMNS} FROM services WHERE TRUE"));
    push_filters(&mut fetch, &params);
    fetch
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let services = fetch.build_query_as::<Service>().fetch_all(&state.pool).await?;

    Ok(Json(ListResponse {
        data: services,
        total,
        page: pagination.page(),
        limit: pagination.limit(),
    }))
}

pub async fn find_service(state: &AppState, id: Uuid) -> Result<Service> {
    let query = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1");
    sqlx::query_as::<_, Service>(&query)
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Servizio non trovato".into()))
}

fn ensure_owner(user: &User, service: &Service) -> Result<()> {
    if service.provider_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Non puoi modificare questo servizio".into()))
    }
}

async fn get_service(Extension(state): Extension<AppState>, Path(id): Path<Uuid>) -> Result<Json<Service>> {
    Ok(Json(find_service(&state, id).await?))
}

async fn create_service(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateServiceRequest>,
) -> Result<Json<Service>> {
    if user.kind()? != UserType::Provider {
        return Err(AppError::Forbidden("Solo i fornitori possono pubblicare servizi".into()));
    }
    request.validate()?;

    let mut tx = state.pool.begin().await?;
    db::ensure_profile(&mut tx, user.id, UserType::Provider).await?;

    let query = format!(
        "INSERT INTO services (id, provider_id, title, description, category, pricing_unit, base_price,
             location_type, duration_hours, max_participants, service_areas, image_url, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         RETURNING {SERVICE_COLUMNS}"
    );
    let service = sqlx::query_as::<_, Service>(&query)
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(request.title.trim())
        .bind(request.description())
        .bind(request.category.as_str())
        .bind(request.pricing_unit.as_str())
        .bind(request.base_price)
        .bind(request.location_type.as_str())
        .bind(request.duration_hours)
        .bind(request.max_participants)
        .bind(request.normalized_areas())
        .bind(clean_optional(request.image_url.clone()))
        .bind(request.is_active.unwrap_or(true))
        .fetch_one(&mut tx)
        .await?;
    tx.commit().await?;

    info!(service_id = %service.id, provider_id = %user.id, "Service created");
    Ok(Json(service))
}

async fn update_service(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<Service>> {
    let existing = find_service(&state, id).await?;
    ensure_owner(&user, &existing)?;
    request.validate()?;

    let query = format!(
        "UPDATE services SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            pricing_unit = COALESCE($5, pricing_unit),
            base_price = COALESCE($6, base_price),
            location_type = COALESCE($7, location_type),
            duration_hours = COALESCE($8, duration_hours),
            max_participants = COALESCE($9, max_participants),
            service_areas = COALESCE($10, service_areas),
            image_url = COALESCE($11, image_url),
            is_active = COALESCE($12, is_active),
            updated_at = NOW()
         WHERE id = $1
         RETURNING {SERVICE_COLUMNS}"
    );
    let service = sqlx::query_as::<_, Service>(&query)
        .bind(id)
        .bind(request.title.as_deref().map(str::trim))
        .bind(clean_optional(request.description))
        .bind(request.category.map(|c| c.as_str()))
        .bind(request.pricing_unit.map(|p| p.as_str()))
        .bind(request.base_price)
        .bind(request.location_type.map(|l| l.as_str()))
        .bind(request.duration_hours)
        .bind(request.max_participants)
        .bind(request.service_areas.as_deref().map(normalize_areas))
        .bind(clean_optional(request.image_url))
        .bind(request.is_active)
        .fetch_one(&state.pool)
        .await?;

    info!(service_id = %id, user_id = %user.id, "Service updated");
    Ok(Json(service))
}

/// Services with booking history are deactivated instead of deleted.
async fn delete_service(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let service = find_service(&state, id).await?;
    ensure_owner(&user, &service)?;

    let bookings: i64 = sqlx::query("SELECT COUNT(*) AS total FROM bookings WHERE service_id = $1")
        .bind(id)
        .fetch_one(&state.pool)
        .await?
        .try_get("total")?;

    if bookings > 0 {
        sqlx::query("UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
        info!(service_id = %id, bookings, "Service deactivated");
        Ok(Json(json!({ "success": true, "deleted": false, "deactivated": true })))
    } else {
        sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&state.pool)
            .await?;
        info!(service_id = %id, "Service deleted");
        Ok(Json(json!({ "success": true, "deleted": true, "deactivated": false })))
    }
}
