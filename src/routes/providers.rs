use axum::{
    extract::{Extension, Json, Path, Query},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use super::services::SERVICE_COLUMNS;
use crate::{
    error::{AppError, Result},
    geo::{
        distance_stats, format_distance, group_by_distance, normalize_radius, search_within_radius, DistanceGroups,
        DistanceStats, GeoPoint, WithDistance,
    },
    model::{
        profile::ProviderSummary,
        service::{Service, ServiceCategory},
        ListResponse, Pagination,
    },
    state::AppState,
};

const SUMMARY_SELECT: &str = "SELECT p.user_id, p.business_name, p.description, p.city, p.province, p.region, \
     p.latitude, p.longitude, p.service_radius_km, p.verified, \
     r.average_rating, COALESCE(r.review_count, 0) AS review_count \
     FROM provider_profiles p \
     LEFT JOIN (SELECT provider_id, AVG(rating)::float8 AS average_rating, COUNT(*) AS review_count \
                FROM reviews GROUP BY provider_id) r ON r.provider_id = p.user_id \
     WHERE TRUE";

pub fn providers_router() -> Router {
    Router::new()
        .route("/api/providers", get(list_providers))
        .route("/api/providers/nearby", get(nearby_providers))
        .route("/api/providers/:id", get(get_provider))
}

#[derive(Debug, Deserialize)]
struct ProviderQuery {
    category: Option<ServiceCategory>,
    region: Option<String>,
    city: Option<String>,
    verified_only: Option<bool>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct NearbyQuery {
    lat: f64,
    lon: f64,
    radius_km: Option<f64>,
    category: Option<ServiceCategory>,
}

#[derive(Debug, Serialize)]
struct NearbyProvider {
    #[serde(flatten)]
    result: WithDistance<ProviderSummary>,
    distance_label: String,
}

#[derive(Debug, Serialize)]
struct NearbyResponse {
    center: GeoPoint,
    radius_km: f64,
    results: Vec<NearbyProvider>,
    groups: DistanceGroups<ProviderSummary>,
    stats: Option<DistanceStats>,
}

#[derive(Debug, Serialize)]
struct ProviderDetail {
    #[serde(flatten)]
    provider: ProviderSummary,
    services: Vec<Service>,
}

fn push_category(builder: &mut QueryBuilder<'_, Postgres>, category: Option<ServiceCategory>) {
    if let Some(category) = category {
        builder
            .push(" AND EXISTS (SELECT 1 FROM services s WHERE s.provider_id = p.user_id AND s.is_active AND s.category = ")
            .push_bind(category.as_str())
            .push(")");
    }
}

fn push_provider_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ProviderQuery) {
    push_category(builder, params.category);
    if let Some(region) = params.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        builder.push(" AND p.region ILIKE ").push_bind(region.to_string());
    }
    if let Some(city) = params.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        builder.push(" AND p.city ILIKE ").push_bind(city.to_string());
    }
    if params.verified_only.unwrap_or(false) {
        builder.push(" AND p.verified");
    }
}

async fn list_providers(
    Extension(state): Extension<AppState>,
    Query(params): Query<ProviderQuery>,
) -> Result<Json<ListResponse<ProviderSummary>>> {
    let pagination = Pagination {
        page: params.page,
        limit: params.limit,
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM provider_profiles p WHERE TRUE");
    push_provider_filters(&mut count, &params);
    let total: i64 = count.build().fetch_one(&state.pool).await?.try_get("total")?;

    let mut fetch = QueryBuilder::new(SUMMARY_SELECT);
    push_provider_filters(&mut fetch, &params);
    fetch
        .push(" ORDER BY r.average_rating DESC NULLS LAST, p.business_name ASC LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let providers = fetch.build_query_as::<ProviderSummary>().fetch_all(&state.pool).await?;

    Ok(Json(ListResponse {
        data: providers,
        total,
        page: pagination.page(),
        limit: pagination.limit(),
    }))
}

async fn nearby_providers(
    Extension(state): Extension<AppState>,
    Query(params): Query<NearbyQuery>,
) -> Result<Json<NearbyResponse>> {
    let center = GeoPoint::new(params.lat, params.lon)?;
    let radius_km = normalize_radius(params.radius_km)?;

    let mut query = QueryBuilder::new(SUMMARY_SELECT);
    query.push(" AND p.latitude IS NOT NULL AND p.longitude IS NOT NULL");
    push_category(&mut query, params.category);
    let candidates = query.build_query_as::<ProviderSummary>().fetch_all(&state.pool).await?;
    let scanned = candidates.len();

    let found = search_within_radius(candidates, center, radius_km);
    debug!(scanned, found = found.len(), radius_km, "Nearby provider search");

    let stats = distance_stats(&found);
    let results = found
        .iter()
        .cloned()
        .map(|result| NearbyProvider {
            distance_label: format_distance(result.distance_km),
            result,
        })
        .collect();

    Ok(Json(NearbyResponse {
        center,
        radius_km,
        results,
        groups: group_by_distance(found),
        stats,
    }))
}

async fn get_provider(Extension(state): Extension<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProviderDetail>> {
    let mut query = QueryBuilder::new(SUMMARY_SELECT);
    query.push(" AND p.user_id = ").push_bind(id);
    let provider = query
        .build_query_as::<ProviderSummary>()
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Fornitore non trovato".into()))?;

    let services_query = format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE provider_id = $1 AND is_active ORDER BY created_at DESC"
    );
    let services = sqlx::query_as::<_, Service>(&services_query)
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(ProviderDetail { provider, services }))
}
