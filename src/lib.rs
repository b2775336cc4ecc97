pub mod auth;
pub mod cache;
pub mod config;
pub mod contact;
pub mod db;
pub mod error;
pub mod geo;
pub mod logging;
pub mod mail;
pub mod model;
pub mod routes;
pub mod state;
pub mod storage;

use std::path::Path;

use axum::{extract::Extension, http::HeaderValue, Router};
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use config::AppConfig;
use error::{AppError, Result};
use routes::{
    bookings::bookings_router, contact::contact_router, documents::documents_router, geo::geocode_router,
    health::health_router, images::images_router, notifications::notifications_router,
    profiles::profiles_router, providers::providers_router, reviews::reviews_router, services::services_router,
    users::users_router,
};
use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let static_dir = Path::new(&state.config.static_dir);
    let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(static_dir.join("index.html")));

    let cors = match state
        .config
        .cors_origin
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok())
    {
        Some(origin) => CorsLayer::new().allow_origin(origin),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Router::new()
        .merge(health_router())
        .merge(contact_router())
        .merge(services_router())
        .merge(providers_router())
        .merge(bookings_router())
        .merge(reviews_router())
        .merge(notifications_router())
        .merge(documents_router())
        .merge(images_router())
        .merge(geocode_router())
        .nest("/api/users", users_router())
        .nest("/api/profiles", profiles_router())
        // Everything else is the single-page front end.
        .fallback_service(serve_dir)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn start_server(config: AppConfig) -> Result<()> {
    logging::init_logging(&config.logging)?;
    info!(
        address = %config.server_address(),
        run_migrations = config.run_migrations,
        image_cache_mb = config.image_cache.max_size_mb,
        image_proxy_hosts = ?config.image_cache.allowed_hosts,
        "Application configuration loaded"
    );

    let pool = db::connect(&config).await?;
    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let cleanup_every = config.image_cache.cleanup_interval;
    let addr = config.server_address();
    let state = AppState::from_config(config, pool)?;
    let cache = state.images.cache().clone();
    let cleanup = cache.spawn_cleanup(cleanup_every);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Io)?;

    cleanup.abort();
    if let Err(err) = cache.flush() {
        warn!(error = %err, "Image cache flush failed");
    }
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                error!(error = %err, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
