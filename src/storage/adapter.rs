//! Validate → optimize → upload.
//!
//! Validation failures return before the provider is called. Upload
//! failures are returned as-is; nothing here retries.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{
    optimize::optimize_image_blocking,
    provider::StorageProvider,
    validation::{sanitize_file_name, validate_file, IncomingFile, StorageBucket},
};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Validating,
    Optimizing,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub state: UploadState,
    pub completed: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

impl UploadProgress {
    fn idle() -> Self {
        Self {
            state: UploadState::Idle,
            completed: 0,
            total: 0,
            current_file: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub bucket: &'static str,
    pub path: String,
    pub url: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub original_name: String,
}

/// Images are re-encoded with the options of their bucket's rules.
pub struct StorageAdapter {
    provider: Arc<dyn StorageProvider>,
}

impl StorageAdapter {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn upload(&self, bucket: StorageBucket, owner: &str, file: IncomingFile) -> Result<UploadResult> {
        self.upload_tracked(bucket, owner, file, &CancellationToken::new(), |_| {}).await
    }

    /// Uploads files one at a time, publishing each step on `progress`.
    /// Stops at the first failure, or with [`AppError::Cancelled`] once
    /// `cancel` is triggered.
    pub async fn upload_many(
        &self,
        bucket: StorageBucket,
        owner: &str,
        files: Vec<IncomingFile>,
        cancel: &CancellationToken,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<Vec<UploadResult>> {
        let total = files.len();
        let mut results = Vec::with_capacity(total);

        for file in files {
            let name = file.file_name.clone();
            let completed = results.len();
            let outcome = self
                .upload_tracked(bucket, owner, file, cancel, |state| {
                    progress.send_replace(UploadProgress {
                        state,
                        completed,
                        total,
                        current_file: Some(name.clone()),
                    });
                })
                .await;

            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    let state = if matches!(err, AppError::Cancelled) {
                        UploadState::Cancelled
                    } else {
                        UploadState::Failed
                    };
                    progress.send_replace(UploadProgress {
                        state,
                        completed: results.len(),
                        total,
                        current_file: Some(name),
                    });
                    return Err(err);
                }
            }
        }

        progress.send_replace(UploadProgress {
            state: UploadState::Completed,
            completed: results.len(),
            total,
            current_file: None,
        });
        Ok(results)
    }

    async fn upload_tracked<F>(
        &self,
        bucket: StorageBucket,
        owner: &str,
        file: IncomingFile,
        cancel: &CancellationToken,
        mut report: F,
    ) -> Result<UploadResult>
    where
        F: FnMut(UploadState),
    {
        let rules = bucket.rules();
        let original_name = file.file_name.clone();

        check_cancelled(cancel)?;
        report(UploadState::Validating);
        validate_file(&file, &rules)?;

        let image_options = rules.optimize.filter(|_| file.is_image());
        let (bytes, content_type, file_name) = if let Some(options) = image_options {
            check_cancelled(cancel)?;
            report(UploadState::Optimizing);
            let optimized = optimize_image_blocking(file.bytes, options).await?;
            let stem = original_name
                .rsplit_once('.')
                .map_or(original_name.as_str(), |(stem, _)| stem);
            (
                optimized.bytes,
                optimized.content_type.to_string(),
                format!("{stem}.{}", optimized.extension),
            )
        } else {
            (file.bytes, file.content_type, original_name.clone())
        };

        check_cancelled(cancel)?;
        report(UploadState::Uploading);

        let path = object_path(owner, &file_name, chrono::Utc::now().timestamp_millis());
        let size_bytes = bytes.len() as u64;
        let stored = self
            .provider
            .upload(bucket.as_str(), &path, bytes, &content_type)
            .await
            .map_err(|err| {
                warn!(bucket = bucket.as_str(), path = %path, error = %err, "Upload failed");
                err
            })?;

        report(UploadState::Completed);
        info!(bucket = bucket.as_str(), path = %stored, size_bytes, "File uploaded");

        Ok(UploadResult {
            bucket: bucket.as_str(),
            url: self.provider.public_url(bucket.as_str(), &stored),
            path: stored,
            content_type,
            size_bytes,
            original_name,
        })
    }

    pub async fn delete(&self, bucket: StorageBucket, path: &str) -> Result<()> {
        self.provider.delete(bucket.as_str(), path).await
    }
}

pub fn progress_channel() -> (watch::Sender<UploadProgress>, watch::Receiver<UploadProgress>) {
    watch::channel(UploadProgress::idle())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}

/// `{owner}/{unix_millis}_{sanitized_name}`
pub fn object_path(owner: &str, file_name: &str, timestamp_millis: i64) -> String {
    format!("{}/{}_{}", owner, timestamp_millis, sanitize_file_name(file_name))
}
