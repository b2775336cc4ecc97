use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::{
    config::SupabaseConfig,
    error::{AppError, Result},
};

#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stores `bytes` at `path` inside `bucket`, returning the stored path.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    async fn delete(&self, bucket: &str, path: &str) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

pub struct SupabaseStorageProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStorageProvider {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(AppError::Config("Supabase URL is required for storage".into()));
        }
        // The service role key bypasses storage policies; uploads are already
        // authorized by this service.
        let api_key = config
            .service_role_key
            .clone()
            .unwrap_or_else(|| config.anon_key.clone());

        Ok(Self {
            http: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path)
    }
}

#[async_trait]
impl StorageProvider for SupabaseStorageProvider {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let size = bytes.len();
        let response = self
            .http
            .post(self.object_url(bucket, path))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("content-type", content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                status: status.as_u16(),
                message,
            });
        }

        debug!(bucket, path, size, "Uploaded object to Supabase Storage");
        Ok(path.to_string())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/storage/v1/object/{}", self.base_url, bucket))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }
}

/// Placeholder for a Cloudinary backend.
pub struct CloudinaryStorageProvider;

#[async_trait]
impl StorageProvider for CloudinaryStorageProvider {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload(&self, _bucket: &str, _path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(AppError::NotImplemented("Cloudinary storage"))
    }

    async fn delete(&self, _bucket: &str, _path: &str) -> Result<()> {
        Err(AppError::NotImplemented("Cloudinary storage"))
    }

    fn public_url(&self, _bucket: &str, path: &str) -> String {
        path.to_string()
    }
}

/// Placeholder for an S3 backend.
pub struct S3StorageProvider;

#[async_trait]
impl StorageProvider for S3StorageProvider {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, _bucket: &str, _path: &str, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(AppError::NotImplemented("S3 storage"))
    }

    async fn delete(&self, _bucket: &str, _path: &str) -> Result<()> {
        Err(AppError::NotImplemented("S3 storage"))
    }

    fn public_url(&self, _bucket: &str, path: &str) -> String {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SupabaseStorageProvider {
        SupabaseStorageProvider::new(&SupabaseConfig {
            url: "https://example.supabase.co/".into(),
            anon_key: "anon".into(),
            service_role_key: Some("service".into()),
        })
        .unwrap()
    }

    #[test]
    fn builds_public_and_object_urls() {
        let provider = provider();
        assert_eq!(
            provider.public_url("avatars", "u1/1700000000000_me.webp"),
            "https://example.supabase.co/storage/v1/object/public/avatars/u1/1700000000000_me.webp"
        );
        assert_eq!(
            provider.object_url("documents", "u1/a.pdf"),
            "https://example.supabase.co/storage/v1/object/documents/u1/a.pdf"
        );
        assert_eq!(provider.api_key, "service");
    }

    #[test]
    fn requires_url() {
        let result = SupabaseStorageProvider::new(&SupabaseConfig {
            url: String::new(),
            anon_key: "anon".into(),
            service_role_key: None,
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn stub_providers_are_not_implemented() {
        let providers: Vec<Box<dyn StorageProvider>> = vec![Box::new(CloudinaryStorageProvider), Box::new(S3StorageProvider)];
        for provider in providers {
            let err = provider.upload("b", "p", vec![1], "image/png").await.unwrap_err();
            assert!(matches!(err, AppError::NotImplemented(_)));
            assert!(provider.delete("b", "p").await.is_err());
        }
    }
}
