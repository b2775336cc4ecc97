use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::ImageCacheConfig,
    error::Result,
    storage::OptimizeOptions,
};

const MB: u64 = 1024 * 1024;

/// Canonical key for an image URL plus the optimization applied to it.
pub fn cache_key(url: &str, options: &OptimizeOptions) -> String {
    format!(
        "{}|w={}|h={}|q={}|f={}|fit={}",
        url,
        options.width.map_or_else(|| "auto".to_string(), |w| w.to_string()),
        options.height.map_or_else(|| "auto".to_string(), |h| h.to_string()),
        options.quality,
        options.format.extension(),
        match options.fit {
            crate::storage::FitMode::Cover => "cover",
            crate::storage::FitMode::Contain => "contain",
            crate::storage::FitMode::Fill => "fill",
        }
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
}

impl CachedImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            bytes,
            content_type: content_type.into(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
}

struct Entry {
    image: CachedImage,
    /// Monotonic recency stamp; the smallest one is evicted first.
    tick: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    total_bytes: u64,
    clock: u64,
    hits: u64,
    misses: u64,
    /// Keys whose access metadata changed since the last flush.
    touched: HashSet<String>,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.image.size();
        self.touched.remove(key);
        Some(entry)
    }

    fn least_recent(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.tick)
            .map(|(key, _)| key.clone())
    }
}

/// Size-bounded LRU cache of optimized images.
///
/// Entries live in memory and, when a path is configured, are mirrored to
/// a sled tree so they survive restarts. Every sled write happens under the
/// same lock as the in-memory change, so both sides hold the same key set.
/// Access metadata from hits is written back on [`ImageCache::flush`].
pub struct ImageCache {
    inner: Mutex<Inner>,
    store: Option<sled::Db>,
    max_bytes: u64,
    ttl: chrono::Duration,
}

impl ImageCache {
    pub fn open(config: &ImageCacheConfig) -> Result<Self> {
        let store = match &config.path {
            Some(path) => Some(open_store(path)?),
            None => None,
        };

        let cache = Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                total_bytes: 0,
                clock: 0,
                hits: 0,
                misses: 0,
                touched: HashSet::new(),
            }),
            store,
            max_bytes: config.max_size_mb * MB,
            ttl: chrono::Duration::from_std(config.ttl).unwrap_or_else(|_| chrono::Duration::days(7)),
        };
        cache.load_persisted()?;
        Ok(cache)
    }

    /// Byte-exact bound, for callers that do not think in megabytes.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn load_persisted(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let now = Utc::now();
        let mut loaded: Vec<(String, CachedImage)> = Vec::new();
        let mut stale: Vec<Vec<u8>> = Vec::new();

        for item in store.iter() {
            let (key, value) = item?;
            match bincode::deserialize::<CachedImage>(&value) {
                Ok(image) if !self.is_expired(&image, now) => {
                    loaded.push((String::from_utf8_lossy(&key).into_owned(), image));
                }
                Ok(_) => stale.push(key.to_vec()),
                Err(err) => {
                    warn!(error = %err, "Dropping unreadable image cache entry");
                    stale.push(key.to_vec());
                }
            }
        }

        for key in stale {
            store.remove(key)?;
        }

        // Oldest access first so the most recently used end up newest.
        loaded.sort_by_key(|(_, image)| (image.last_accessed, image.access_count));
        let count = loaded.len();
        let evicted = {
            let mut inner = self.inner.lock();
            for (key, image) in loaded {
                let tick = inner.next_tick();
                inner.total_bytes += image.size();
                inner.entries.insert(key, Entry { image, tick });
            }
            let evicted = self.evict_over_budget(&mut inner);
            self.remove_persisted(&evicted)?;
            evicted
        };

        info!(entries = count - evicted.len(), "Image cache loaded from disk");
        Ok(())
    }

    fn is_expired(&self, image: &CachedImage, now: DateTime<Utc>) -> bool {
        now - image.created_at > self.ttl
    }

    pub fn get(&self, key: &str) -> Result<Option<CachedImage>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return Ok(None);
            }
            Some(entry) => self.is_expired(&entry.image, now),
        };

        if expired {
            inner.remove(key);
            inner.misses += 1;
            self.remove_persisted(&[key.to_string()])?;
            debug!(key, "Image cache entry expired");
            return Ok(None);
        }

        let tick = inner.next_tick();
        inner.hits += 1;
        if self.store.is_some() {
            inner.touched.insert(key.to_string());
        }
        Ok(inner.entries.get_mut(key).map(|entry| {
            entry.tick = tick;
            entry.image.last_accessed = now;
            entry.image.access_count += 1;
            entry.image.clone()
        }))
    }

    /// Returns false when the image alone exceeds the whole budget and was
    /// therefore not cached.
    pub fn put(&self, key: &str, image: CachedImage) -> Result<bool> {
        if image.size() > self.max_bytes {
            debug!(key, size = image.size(), "Image larger than cache budget, not cached");
            return Ok(false);
        }

        let encoded = match &self.store {
            Some(_) => Some(bincode::serialize(&image)?),
            None => None,
        };

        let mut inner = self.inner.lock();
        inner.remove(key);
        let tick = inner.next_tick();
        inner.total_bytes += image.size();
        inner.entries.insert(key.to_string(), Entry { image, tick });
        let evicted = self.evict_over_budget(&mut inner);

        if let (Some(store), Some(encoded)) = (&self.store, encoded) {
            store.insert(key.as_bytes(), encoded)?;
        }
        self.remove_persisted(&evicted)?;
        Ok(true)
    }

    fn evict_over_budget(&self, inner: &mut Inner) -> Vec<String> {
        let mut evicted = Vec::new();
        while inner.total_bytes > self.max_bytes {
            let Some(key) = inner.least_recent() else {
                break;
            };
            inner.remove(&key);
            evicted.push(key);
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted least recently used images");
        }
        evicted
    }

    fn remove_persisted(&self, keys: &[String]) -> Result<()> {
        if let Some(store) = &self.store {
            for key in keys {
                store.remove(key.as_bytes())?;
            }
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let removed = inner.remove(key).is_some();
        self.remove_persisted(&[key.to_string()])?;
        Ok(removed)
    }

    /// Drops every expired entry, returning how many went.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut inner = self.inner.lock();
            let keys: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| self.is_expired(&entry.image, now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                inner.remove(key);
            }
            self.remove_persisted(&keys)?;
            keys
        };

        if !expired.is_empty() {
            info!(count = expired.len(), "Purged expired images from cache");
        }
        Ok(expired.len())
    }

    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.touched.clear();
        inner.total_bytes = 0;
        if let Some(store) = &self.store {
            store.clear()?;
            store.flush()?;
        }
        Ok(())
    }

    /// Writes pending access metadata to disk and syncs the store.
    pub fn flush(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut inner = self.inner.lock();
        let touched: Vec<String> = inner.touched.drain().collect();
        for key in &touched {
            if let Some(entry) = inner.entries.get(key) {
                store.insert(key.as_bytes(), bincode::serialize(&entry.image)?)?;
            }
        }
        drop(inner);

        store.flush()?;
        if !touched.is_empty() {
            debug!(count = touched.len(), "Persisted image cache access metadata");
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            max_bytes: self.max_bytes,
        }
    }

    /// Periodic TTL purge and metadata flush on the runtime. Abort the handle to stop it.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(err) = cache.purge_expired().and_then(|_| cache.flush()) {
                    warn!(error = %err, "Image cache cleanup failed");
                }
            }
        })
    }
}

fn open_store(path: &Path) -> Result<sled::Db> {
    std::fs::create_dir_all(path)?;
    Ok(sled::open(path)?)
}
