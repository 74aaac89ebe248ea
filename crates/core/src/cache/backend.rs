//! Reference cache backend trait.

use async_trait::async_trait;

/// Identity of a cached reference: the decoded bytes are a pure function
/// of this triple, so cross-process writers cannot corrupt one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefCacheKey {
    /// Bucket holding the reference.
    pub bucket: String,
    /// Absolute storage key of the reference object.
    pub ref_key: String,
    /// SHA-256 of the reference's original bytes (hex).
    pub ref_sha256: String,
}

impl RefCacheKey {
    /// Create a cache key.
    pub fn new(
        bucket: impl Into<String>,
        ref_key: impl Into<String>,
        ref_sha256: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            ref_key: ref_key.into(),
            ref_sha256: ref_sha256.into(),
        }
    }
}

/// Pluggable backend holding decoded reference bytes.
///
/// Implementations handle their own error recovery - on failure, methods
/// return None/unit so the caller falls back to re-downloading the
/// reference from the store.
#[async_trait]
pub trait RefCacheBackend: Send + Sync {
    /// Fetch cached bytes for a key. Returns None on miss or read failure.
    async fn get(&self, key: &RefCacheKey) -> Option<Vec<u8>>;

    /// Store bytes for a key. Silently fails on error (caller will
    /// re-download next time).
    async fn put(&self, key: &RefCacheKey, bytes: &[u8]);

    /// Remove an entry (for explicit invalidation).
    async fn evict(&self, key: &RefCacheKey);

    /// Remove all entries.
    async fn clear(&self);
}
