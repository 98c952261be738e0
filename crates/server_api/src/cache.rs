use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use moka::future::Cache;
use shared::{error::ApiError, protocol::GalleryPayload};
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_ENTRIES: u64 = 512;
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 256 * 1024 * 1024;

/// Read-through cache for the public site: gallery payloads keyed by
/// project slug and media bytes keyed by object path. Entries expire after a
/// fixed TTL and are dropped explicitly when admins change content.
///
/// Galleries are capped by entry count, media by total bytes. Each side
/// carries a generation bumped on every invalidation; a load that straddles
/// one is dropped instead of outliving it in the cache.
#[derive(Clone)]
pub struct ContentCache {
    galleries: Cache<String, Arc<GalleryPayload>>,
    media: Cache<String, Arc<Vec<u8>>>,
    gallery_generation: Arc<AtomicU64>,
    media_generation: Arc<AtomicU64>,
}

impl ContentCache {
    pub fn new(ttl: Duration, max_entries: u64, max_media_bytes: u64) -> Self {
        Self {
            galleries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            media: Cache::builder()
                .max_capacity(max_media_bytes)
                .weigher(|_path: &String, bytes: &Arc<Vec<u8>>| -> u32 {
                    u32::try_from(bytes.len()).unwrap_or(u32::MAX)
                })
                .time_to_live(ttl)
                .build(),
            gallery_generation: Arc::new(AtomicU64::new(0)),
            media_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn gallery<F, Fut>(&self, slug: &str, load: F) -> Result<Arc<GalleryPayload>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GalleryPayload, ApiError>>,
    {
        if let Some(hit) = self.galleries.get(slug).await {
            debug!(%slug, "gallery cache hit");
            return Ok(hit);
        }
        debug!(%slug, "gallery cache miss");
        let generation = self.gallery_generation.load(Ordering::SeqCst);
        let payload = Arc::new(load().await?);
        self.galleries.insert(slug.to_string(), payload.clone()).await;
        if self.gallery_generation.load(Ordering::SeqCst) != generation {
            debug!(%slug, "gallery changed during load; not keeping it");
            self.galleries.invalidate(slug).await;
        }
        Ok(payload)
    }

    /// Media bytes; `Ok(None)` (missing object) is not cached.
    pub async fn media<F, Fut>(&self, path: &str, load: F) -> Result<Option<Arc<Vec<u8>>>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<u8>>, ApiError>>,
    {
        if let Some(hit) = self.media.get(path).await {
            return Ok(Some(hit));
        }
        let generation = self.media_generation.load(Ordering::SeqCst);
        let Some(bytes) = load().await? else {
            return Ok(None);
        };
        let bytes = Arc::new(bytes);
        self.media.insert(path.to_string(), bytes.clone()).await;
        if self.media_generation.load(Ordering::SeqCst) != generation {
            self.media.invalidate(path).await;
        }
        Ok(Some(bytes))
    }

    pub async fn invalidate_gallery(&self, slug: &str) {
        debug!(%slug, "dropping cached gallery");
        self.gallery_generation.fetch_add(1, Ordering::SeqCst);
        self.galleries.invalidate(slug).await;
    }

    pub fn invalidate_media(&self) {
        self.media_generation.fetch_add(1, Ordering::SeqCst);
        self.media.invalidate_all();
    }

    /// Manual cache-bust: drops everything.
    pub fn bust(&self) {
        info!("content cache busted");
        self.gallery_generation.fetch_add(1, Ordering::SeqCst);
        self.media_generation.fetch_add(1, Ordering::SeqCst);
        self.galleries.invalidate_all();
        self.media.invalidate_all();
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_MEDIA_BYTES)
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
