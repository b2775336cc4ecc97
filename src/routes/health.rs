use std::time::Duration;

use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

pub fn health_router() -> Router {
    Router::new().route("/api/health", get(health))
}

/// Liveness plus a bounded database probe. Always 200.
async fn health(Extension(state): Extension<AppState>) -> Json<Value> {
    let probe = sqlx::query("SELECT 1").execute(&state.pool);
    let database = match tokio::time::timeout(Duration::from_secs(2), probe).await {
        Ok(Ok(_)) => "ok",
        Ok(Err(err)) => {
            warn!(error = %err, "Database health check failed");
            "unavailable"
        }
        Err(_) => {
            warn!("Database health check timed out");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
        "storage": state.storage.provider_name(),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}
