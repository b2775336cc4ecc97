pub mod image_cache;
pub mod service;

pub use image_cache::{cache_key, CacheStats, CachedImage, ImageCache};
pub use service::ImageService;
