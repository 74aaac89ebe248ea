//! Process-local cache of decoded reference blobs.
//!
//! Keyed by `(bucket, reference key, content hash)` with per-key
//! single-flight population: while one task downloads a reference, all
//! others awaiting the same triple coalesce onto that download and observe
//! the same cached bytes.

mod backend;
mod filesystem;
mod memory;

pub use backend::{RefCacheBackend, RefCacheKey};
pub use filesystem::FsRefCache;
pub use memory::MemoryRefCache;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use deltaglider_common::{hash::verify_sha256, CacheBackendKind, DeltaGliderConfig};

use crate::error::DeltaError;

/// Reference cache facade with verification and single-flight population.
pub struct ReferenceCache {
    /// The storage backend.
    backend: Box<dyn RefCacheBackend>,
    /// In-flight population guards, one per key.
    flights: Mutex<HashMap<RefCacheKey, Arc<Mutex<()>>>>,
}

impl ReferenceCache {
    /// Create a cache with the given backend.
    pub fn new(backend: impl RefCacheBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Create a cache from configuration, choosing the configured backend.
    pub fn from_config(config: &DeltaGliderConfig) -> Self {
        match config.cache_backend {
            CacheBackendKind::Filesystem => Self::new(FsRefCache::new(
                config.cache_dir.clone(),
                config.cache_max_bytes,
                config.cache_encryption_key.as_deref(),
            )),
            CacheBackendKind::Memory => Self::new(MemoryRefCache::new(
                config.cache_memory_size_mb * 1024 * 1024,
            )),
        }
    }

    /// Whether an entry for this key is currently cached.
    ///
    /// Advisory (used for cache-hit reporting); the entry is still verified
    /// on every actual read.
    pub async fn contains(&self, key: &RefCacheKey) -> bool {
        self.backend.get(key).await.is_some()
    }

    /// Fetch the decoded reference bytes, populating the cache on miss.
    ///
    /// Every read is verified against the key's hash. A cached entry that
    /// fails verification is evicted and the miss path re-executed; a fetch
    /// that fails verification is retried once from the store, after which
    /// `ReferenceCorrupt` surfaces.
    ///
    /// # Arguments
    /// * `key` - Cache key (bucket, reference key, expected SHA-256)
    /// * `fetch` - Downloads the reference body from the store
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &RefCacheKey,
        fetch: F,
    ) -> Result<Vec<u8>, DeltaError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, DeltaError>>,
    {
        let flight: Arc<Mutex<()>> = self.flight_guard(key).await;
        let _guard = flight.lock().await;

        let result: Result<Vec<u8>, DeltaError> = self.populate_locked(key, fetch).await;

        drop(_guard);
        self.release_flight(key, flight).await;
        result
    }

    /// Seed the cache with bytes already in hand (e.g. a reference this
    /// process just uploaded). Bytes that do not match the key's hash are
    /// dropped silently.
    pub async fn insert(&self, key: &RefCacheKey, bytes: &[u8]) {
        if verify_sha256(bytes, &key.ref_sha256) {
            self.backend.put(key, bytes).await;
        }
    }

    /// Remove a cache entry.
    pub async fn evict(&self, key: &RefCacheKey) {
        self.backend.evict(key).await;
    }

    /// Remove all cache entries.
    pub async fn clear(&self) {
        self.backend.clear().await;
    }

    async fn populate_locked<F, Fut>(
        &self,
        key: &RefCacheKey,
        fetch: F,
    ) -> Result<Vec<u8>, DeltaError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, DeltaError>>,
    {
        if let Some(cached) = self.backend.get(key).await {
            if verify_sha256(&cached, &key.ref_sha256) {
                debug!(ref_key = %key.ref_key, "reference cache hit");
                return Ok(cached);
            }
            warn!(ref_key = %key.ref_key, "cached reference failed verification, evicting");
            self.backend.evict(key).await;
        }

        for attempt in 0..2u32 {
            let bytes: Vec<u8> = fetch().await?;
            if verify_sha256(&bytes, &key.ref_sha256) {
                self.backend.put(key, &bytes).await;
                return Ok(bytes);
            }
            warn!(
                ref_key = %key.ref_key,
                attempt,
                "downloaded reference failed verification"
            );
        }

        Err(DeltaError::ReferenceCorrupt {
            ref_key: key.ref_key.clone(),
            expected: key.ref_sha256.clone(),
        })
    }

    /// Get or create the single-flight guard for a key.
    async fn flight_guard(&self, key: &RefCacheKey) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the guard entry once no other task holds it.
    async fn release_flight(&self, key: &RefCacheKey, flight: Arc<Mutex<()>>) {
        let mut flights = self.flights.lock().await;
        // Two strong counts: the map's and ours.
        if Arc::strong_count(&flight) <= 2 {
            flights.remove(key);
        }
    }
}
