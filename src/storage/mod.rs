pub mod adapter;
pub mod optimize;
pub mod provider;
pub mod validation;

pub use adapter::{progress_channel, CancellationToken, StorageAdapter, UploadProgress, UploadResult, UploadState};
pub use optimize::{FitMode, OptimizeOptions, OutputFormat};
pub use provider::{StorageProvider, SupabaseStorageProvider};
pub use validation::{resolve_content_type, IncomingFile, StorageBucket};
