use axum::{
    extract::{Extension, Query},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        HeaderValue,
    },
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    auth::CurrentUser,
    cache::CacheStats,
    error::{AppError, Result},
    state::AppState,
    storage::{optimize::DEFAULT_QUALITY, FitMode, OptimizeOptions, OutputFormat},
};

pub fn images_router() -> Router {
    Router::new()
        .route("/api/images", get(get_image))
        .route("/api/images/stats", get(stats))
        .route("/api/images/cache", delete(clear_cache))
}

#[derive(Debug, Deserialize)]
struct ImageParams {
    url: String,
    w: Option<u32>,
    h: Option<u32>,
    q: Option<u8>,
    format: Option<OutputFormat>,
    fit: Option<FitMode>,
}

impl ImageParams {
    fn options(&self) -> OptimizeOptions {
        OptimizeOptions {
            width: self.w,
            height: self.h,
            quality: self.q.unwrap_or(DEFAULT_QUALITY),
            format: self.format.unwrap_or_default(),
            fit: self.fit.unwrap_or_default(),
        }
    }
}

async fn get_image(
    Extension(state): Extension<AppState>,
    Query(params): Query<ImageParams>,
) -> Result<Response> {
    let image = state.images.fetch_optimized(&params.url, params.options()).await?;

    let content_type = HeaderValue::from_str(&image.content_type)
        .map_err(|e| AppError::Internal(format!("Invalid cached content type: {e}")))?;
    let max_age = state.config.image_cache.ttl.as_secs();
    let cache_control = HeaderValue::from_str(&format!("public, max-age={max_age}"))
        .map_err(|e| AppError::Internal(format!("Invalid cache header: {e}")))?;

    Ok(([(CONTENT_TYPE, content_type), (CACHE_CONTROL, cache_control)], image.bytes).into_response())
}

async fn stats(Extension(state): Extension<AppState>) -> Json<CacheStats> {
    Json(state.images.stats())
}

async fn clear_cache(
    Extension(state): Extension<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Solo gli amministratori possono svuotare la cache".into()));
    }
    state.images.cache().clear()?;
    info!(user_id = %user.id, "Image cache cleared");
    Ok(Json(json!({ "success": true })))
}
