use axum::{
    extract::{Extension, Query},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::Result,
    geo::{GeoPoint, GeocodeResult},
    state::AppState,
};

pub fn geocode_router() -> Router {
    Router::new()
        .route("/api/geocode/search", get(search))
        .route("/api/geocode/reverse", get(reverse))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ReverseParams {
    lat: f64,
    lon: f64,
}

async fn search(
    Extension(state): Extension<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<GeocodeResult>>> {
    let results = state.geocoder.search(&params.q, params.limit.unwrap_or(5)).await?;
    Ok(Json(results))
}

async fn reverse(
    Extension(state): Extension<AppState>,
    Query(params): Query<ReverseParams>,
) -> Result<Json<Value>> {
    let point = GeoPoint::new(params.lat, params.lon)?;
    let result = state.geocoder.reverse(point).await?;
    Ok(Json(json!({ "result": result })))
}
