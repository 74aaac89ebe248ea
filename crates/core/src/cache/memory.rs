//! In-memory reference cache, bounded by total bytes.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;

use super::backend::{RefCacheBackend, RefCacheKey};

/// Entry-count ceiling; the real bound is bytes.
const MAX_ENTRIES: usize = 1024;

/// Byte-bounded in-memory LRU cache backend.
pub struct MemoryRefCache {
    inner: Mutex<Inner>,
}

struct Inner {
    cache: LruCache<RefCacheKey, Vec<u8>>,
    total_bytes: u64,
    max_bytes: u64,
}

impl MemoryRefCache {
    /// Create a memory cache bounded by `max_bytes` of reference data.
    pub fn new(max_bytes: u64) -> Self {
        let capacity: NonZeroUsize =
            NonZeroUsize::new(MAX_ENTRIES).expect("MAX_ENTRIES is nonzero");
        Self {
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                total_bytes: 0,
                max_bytes,
            }),
        }
    }

    /// Current total of cached bytes.
    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().unwrap().total_bytes
    }
}

#[async_trait]
impl RefCacheBackend for MemoryRefCache {
    async fn get(&self, key: &RefCacheKey) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.get(key).cloned()
    }

    async fn put(&self, key: &RefCacheKey, bytes: &[u8]) {
        let size: u64 = bytes.len() as u64;
        let mut inner = self.inner.lock().unwrap();

        if size > inner.max_bytes {
            // A single oversized reference would evict everything for nothing.
            return;
        }

        if let Some(existing) = inner.cache.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(existing.len() as u64);
        }

        while inner.total_bytes + size > inner.max_bytes && !inner.cache.is_empty() {
            if let Some((_, evicted)) = inner.cache.pop_lru() {
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len() as u64);
            }
        }

        inner.total_bytes += size;
        inner.cache.put(key.clone(), bytes.to_vec());
    }

    async fn evict(&self, key: &RefCacheKey) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(removed) = inner.cache.pop(key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(removed.len() as u64);
        }
    }

    async fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.clear();
        inner.total_bytes = 0;
    }
}
