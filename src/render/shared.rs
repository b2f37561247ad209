//! Document-level LRU cache of rendered pages
//!
//! Optional and shared between workers (and between viewers showing the
//! same document). Entries are keyed by `(document, page, scale)` and live
//! independently of any viewer's visible window.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use super::request::{RenderJob, RenderOutput};
use crate::types::DocumentId;

/// Cache key for rendered pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SharedCacheKey {
    pub document: DocumentId,
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u64,
}

impl SharedCacheKey {
    #[must_use]
    pub fn new(document: DocumentId, page: usize, scale: f64) -> Self {
        Self {
            document,
            page,
            scale_millionths: (scale * 1_000_000.0).round() as u64,
        }
    }

    #[must_use]
    pub fn from_job(job: &RenderJob) -> Self {
        Self::new(job.document, job.ticket.page, job.scale)
    }
}

/// LRU cache for rendered page data
pub struct SharedPageCache {
    cache: LruCache<SharedCacheKey, RenderOutput>,
}

/// Handle shared between worker threads
pub type SharedCacheHandle = Arc<Mutex<SharedPageCache>>;

impl SharedPageCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    #[must_use]
    pub fn shared(capacity: usize) -> SharedCacheHandle {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &SharedCacheKey) -> Option<RenderOutput> {
        self.cache.get(key).cloned()
    }

    pub fn insert(&mut self, key: SharedCacheKey, output: RenderOutput) {
        self.cache.put(key, output);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
