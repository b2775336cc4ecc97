use std::{sync::Arc, time::Duration};

use reqwest::{redirect, Client};
use tracing::{debug, info};

use super::image_cache::{cache_key, CacheStats, CachedImage, ImageCache};
use crate::{
    error::{
        retry::{retry_with_backoff, RetryPolicy},
        AppError, Result,
    },
    storage::{optimize::optimize_image_blocking, OptimizeOptions},
};

/// Largest source image the proxy will download.
pub const MAX_SOURCE_BYTES: usize = 20 * 1024 * 1024;

/// Fetches remote images, optimizes them and keeps the result in the cache.
///
/// Only hosts on the allow list are contacted, and redirects are never
/// followed, so the proxy cannot be pointed at internal addresses.
pub struct ImageService {
    http: Client,
    cache: Arc<ImageCache>,
    retry: RetryPolicy,
    allowed_hosts: Vec<String>,
    max_source_bytes: usize,
}

impl ImageService {
    pub fn new(cache: Arc<ImageCache>, allowed_hosts: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            cache,
            retry: RetryPolicy::default(),
            allowed_hosts: allowed_hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            max_source_bytes: MAX_SOURCE_BYTES,
        })
    }

    pub fn with_max_source_bytes(mut self, max_source_bytes: usize) -> Self {
        self.max_source_bytes = max_source_bytes;
        self
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn fetch_optimized(&self, url: &str, options: OptimizeOptions) -> Result<CachedImage> {
        validate_source_url(url, &self.allowed_hosts)?;
        options.validate()?;

        let key = cache_key(url, &options);
        if let Some(hit) = self.cache.get(&key)? {
            debug!(url, "Image cache hit");
            return Ok(hit);
        }

        let source = self.download(url).await?;
        let optimized = optimize_image_blocking(source, options).await?;
        let image = CachedImage::new(optimized.bytes, optimized.content_type);

        self.cache.put(&key, image.clone())?;
        info!(url, width = optimized.width, height = optimized.height, "Image optimized and cached");
        Ok(image)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let http = self.http.clone();
        let url = url.to_string();
        let limit = self.max_source_bytes;
        retry_with_backoff(&self.retry, "image download", move || {
            let http = http.clone();
            let url = url.clone();
            async move {
                let mut response = http.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AppError::Upstream {
                        status: status.as_u16(),
                        message: format!("Image source responded with {status}"),
                    });
                }
                if response.content_length().is_some_and(|len| len > limit as u64) {
                    return Err(source_too_large());
                }
                // The declared length can be missing or wrong; count what arrives.
                let mut body = Vec::new();
                while let Some(chunk) = response.chunk().await? {
                    if body.len() + chunk.len() > limit {
                        return Err(source_too_large());
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(body)
            }
        })
        .await
    }
}

fn source_too_large() -> AppError {
    AppError::Validation("L'immagine di origine è troppo grande".into())
}

fn validate_source_url(url: &str, allowed_hosts: &[String]) -> Result<()> {
    let parsed = reqwest::Url::parse(url).map_err(|_| AppError::Validation(format!("URL non valido: {url}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!("URL non supportato: {url}")));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation(format!("URL non supportato: {url}")))?
        .to_ascii_lowercase();
    if !allowed_hosts.contains(&host) {
        return Err(AppError::Validation(format!("Host non consentito: {host}")));
    }
    Ok(())
}
