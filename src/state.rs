use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{SupabaseAuth, TokenVerifier},
    cache::{ImageCache, ImageService},
    config::AppConfig,
    error::Result,
    geo::NominatimClient,
    mail::{mailer_from_config, EmailSender},
    storage::{StorageAdapter, SupabaseStorageProvider},
};

/// Shared services, injected into handlers as an `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<dyn TokenVerifier>,
    pub storage: Arc<StorageAdapter>,
    pub images: Arc<ImageService>,
    pub geocoder: Arc<NominatimClient>,
    pub mailer: Arc<dyn EmailSender>,
}

impl AppState {
    /// Wires the production services from configuration.
    pub fn from_config(config: AppConfig, pool: PgPool) -> Result<Self> {
        let provider = Arc::new(SupabaseStorageProvider::new(&config.supabase)?);
        let cache = Arc::new(ImageCache::open(&config.image_cache)?);

        Ok(Self {
            pool,
            auth: Arc::new(SupabaseAuth::new(&config.supabase)?),
            storage: Arc::new(StorageAdapter::new(provider)),
            images: Arc::new(ImageService::new(cache, config.image_cache.allowed_hosts.clone())?),
            geocoder: Arc::new(NominatimClient::new(&config.geocoding)?),
            mailer: mailer_from_config(&config.email)?,
            config: Arc::new(config),
        })
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn TokenVerifier>) -> Self {
        self.auth = auth;
        self
    }
}
