use axum::{
    extract::{Extension, Json},
    routing::get,
    Router,
};
use serde_json::Value;
use tracing::info;

use crate::{
    auth::CurrentUser,
    db::{self, CLIENT_PROFILE_COLUMNS, PROVIDER_PROFILE_COLUMNS},
    error::{AppError, Result},
    model::{
        clean_optional,
        profile::{ClientProfile, Profile, ProviderProfile, UpdateClientProfileRequest, UpdateProviderProfileRequest},
        user::{User, UserType},
    },
    state::AppState,
};

pub fn profiles_router() -> Router {
    Router::new().route("/me", get(get_my_profile).put(update_my_profile)) // GET|PUT /api/profiles/me
}

/// Loads the caller's profile, creating the empty one on first access.
async fn load_or_create(state: &AppState, user: &User) -> Result<Profile> {
    let kind = user.kind()?;
    if kind == UserType::Admin {
        return Err(AppError::NotFound("Gli amministratori non hanno un profilo".into()));
    }

    let existing = match kind {
        UserType::Client => db::find_client_profile(&state.pool, user.id).await?.map(Profile::Client),
        _ => db::find_provider_profile(&state.pool, user.id).await?.map(Profile::Provider),
    };
    if let Some(profile) = existing {
        return Ok(profile);
    }

    let mut tx = state.pool.begin().await?;
    db::ensure_profile(&mut tx, user.id, kind).await?;
    tx.commit().await?;
    info!(user_id = %user.id, user_type = %kind, "Missing profile created");

    let created = match kind {
        UserType::Client => db::find_client_profile(&state.pool, user.id).await?.map(Profile::Client),
        _ => db::find_provider_profile(&state.pool, user.id).await?.map(Profile::Provider),
    };
    created.ok_or_else(|| AppError::Internal("Profile missing right after creation".into()))
}

async fn get_my_profile(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Profile>> {
    Ok(Json(load_or_create(&state, &user).await?))
}

async fn update_my_profile(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<Value>,
) -> Result<Json<Profile>> {
    // Make sure the row exists before the partial update.
    load_or_create(&state, &user).await?;

    let invalid = |e: serde_json::Error| AppError::Validation(format!("Profilo non valido: {e}"));
    let profile = match user.kind()? {
        UserType::Client => {
            let request: UpdateClientProfileRequest = serde_json::from_value(payload).map_err(invalid)?;
            request.validate()?;
            Profile::Client(update_client(&state, &user, request).await?)
        }
        UserType::Provider => {
            let request: UpdateProviderProfileRequest = serde_json::from_value(payload).map_err(invalid)?;
            request.validate()?;
            Profile::Provider(update_provider(&state, &user, request).await?)
        }
        UserType::Admin => return Err(AppError::NotFound("Gli amministratori non hanno un profilo".into())),
    };

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(profile))
}

async fn update_client(state: &AppState, user: &User, r: UpdateClientProfileRequest) -> Result<ClientProfile> {
    let query = format!(
        "UPDATE client_profiles SET
            company_name = COALESCE($2, company_name),
            vat_number = COALESCE($3, vat_number),
            fiscal_code = COALESCE($4, fiscal_code),
            phone = COALESCE($5, phone),
            address = COALESCE($6, address),
            city = COALESCE($7, city),
            province = COALESCE($8, province),
            postal_code = COALESCE($9, postal_code),
            industry_sector = COALESCE($10, industry_sector),
            employees_count = COALESCE($11, employees_count),
            updated_at = NOW()
         WHERE user_id = $1
         RETURNING {CLIENT_PROFILE_COLUMNS}"
    );
    Ok(sqlx::query_as::<_, ClientProfile>(&query)
        .bind(user.id)
        .bind(clean_optional(r.company_name))
        .bind(clean_optional(r.vat_number))
        .bind(clean_optional(r.fiscal_code).map(|c| c.to_uppercase()))
        .bind(clean_optional(r.phone))
        .bind(clean_optional(r.address))
        .bind(clean_optional(r.city))
        .bind(clean_optional(r.province).map(|p| p.to_uppercase()))
        .bind(clean_optional(r.postal_code))
        .bind(clean_optional(r.industry_sector))
        .bind(r.employees_count)
        .fetch_one(&state.pool)
        .await?)
}

async fn update_provider(state: &AppState, user: &User, r: UpdateProviderProfileRequest) -> Result<ProviderProfile> {
    let query = format!(
        "UPDATE provider_profiles SET
            business_name = COALESCE($2, business_name),
            vat_number = COALESCE($3, vat_number),
            description = COALESCE($4, description),
            phone = COALESCE($5, phone),
            website = COALESCE($6, website),
            address = COALESCE($7, address),
            city = COALESCE($8, city),
            province = COALESCE($9, province),
            postal_code = COALESCE($10, postal_code),
            region = COALESCE($11, region),
            latitude = COALESCE($12, latitude),
            longitude = COALESCE($13, longitude),
            service_radius_km = COALESCE($14, service_radius_km),
            updated_at = NOW()
         WHERE user_id = $1
         RETURNING {PROVIDER_PROFILE_COLUMNS}"
    );
    Ok(sqlx::query_as::<_, ProviderProfile>(&query)
        .bind(user.id)
        .bind(clean_optional(r.business_name))
        .bind(clean_optional(r.vat_number))
        .bind(clean_optional(r.description))
        .bind(clean_optional(r.phone))
        .bind(clean_optional(r.website))
        .bind(clean_optional(r.address))
        .bind(clean_optional(r.city))
        .bind(clean_optional(r.province).map(|p| p.to_uppercase()))
        .bind(clean_optional(r.postal_code))
        .bind(clean_optional(r.region))
        .bind(r.latitude)
        .bind(r.longitude)
        .bind(r.service_radius_km)
        .fetch_one(&state.pool)
        .await?)
}
