//! Disk-backed reference cache.
//!
//! Entries live at `{root}/{bucket}/{sha256[..2]}/{sha256}`. Population
//! writes a temporary file in the destination directory and renames it into
//! place, so concurrent processes sharing the cache directory never observe
//! partial entries. Eviction is best-effort LRU by modification time
//! against a byte quota.
//!
//! When an encryption key is configured, at-rest entries are sealed with
//! AES-256-GCM; the 12-byte nonce is prepended to the ciphertext.

use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit};
use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::backend::{RefCacheBackend, RefCacheKey};

/// Length of the AES-GCM nonce prepended to encrypted entries.
const NONCE_LEN: usize = 12;

/// Filesystem reference cache backend.
pub struct FsRefCache {
    /// Cache root directory.
    root: PathBuf,
    /// Byte quota for eviction.
    max_bytes: u64,
    /// Optional at-rest cipher.
    cipher: Option<Aes256Gcm>,
}

impl FsRefCache {
    /// Create a filesystem cache rooted at `root` with a byte quota.
    ///
    /// # Arguments
    /// * `root` - Cache directory (created on demand)
    /// * `max_bytes` - Total byte quota for eviction
    /// * `encryption_key` - Optional passphrase; entries are AEAD-sealed
    ///   with a key derived via SHA-256. The key is never persisted.
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64, encryption_key: Option<&str>) -> Self {
        let cipher: Option<Aes256Gcm> = encryption_key.map(|passphrase| {
            let key_bytes = Sha256::digest(passphrase.as_bytes());
            Aes256Gcm::new_from_slice(&key_bytes).expect("SHA-256 output is a valid AES-256 key")
        });
        Self {
            root: root.into(),
            max_bytes,
            cipher,
        }
    }

    /// On-disk path of an entry.
    fn entry_path(&self, key: &RefCacheKey) -> PathBuf {
        let shard: &str = key.ref_sha256.get(..2).unwrap_or("xx");
        self.root
            .join(&key.bucket)
            .join(shard)
            .join(&key.ref_sha256)
    }

    /// Seal bytes for disk when encryption is configured.
    fn seal(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        match self.cipher {
            None => Some(plaintext.to_vec()),
            Some(ref cipher) => {
                let mut nonce_bytes: [u8; NONCE_LEN] = [0u8; NONCE_LEN];
                rand::thread_rng().fill_bytes(&mut nonce_bytes);
                let nonce = aes_gcm::Nonce::from_slice(&nonce_bytes);
                let ciphertext: Vec<u8> = cipher.encrypt(nonce, plaintext).ok()?;

                let mut sealed: Vec<u8> = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                sealed.extend_from_slice(&nonce_bytes);
                sealed.extend_from_slice(&ciphertext);
                Some(sealed)
            }
        }
    }

    /// Open bytes from disk when encryption is configured.
    fn unseal(&self, stored: &[u8]) -> Option<Vec<u8>> {
        match self.cipher {
            None => Some(stored.to_vec()),
            Some(ref cipher) => {
                if stored.len() < NONCE_LEN {
                    return None;
                }
                let (nonce_bytes, ciphertext): (&[u8], &[u8]) = stored.split_at(NONCE_LEN);
                let nonce = aes_gcm::Nonce::from_slice(nonce_bytes);
                cipher.decrypt(nonce, ciphertext).ok()
            }
        }
    }

    /// Best-effort LRU eviction until total size fits the quota.
    fn evict_to_quota(&self) {
        let mut entries: Vec<(PathBuf, u64, std::time::SystemTime)> = Vec::new();
        collect_entries(&self.root, &mut entries);

        let mut total: u64 = entries.iter().map(|(_, size, _)| *size).sum();
        if total <= self.max_bytes {
            return;
        }

        // Oldest first
        entries.sort_by_key(|(_, _, mtime)| *mtime);
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), size, "evicted cache entry");
                total = total.saturating_sub(size);
            }
        }
    }
}

/// Recursively collect (path, size, mtime) for all regular files.
fn collect_entries(dir: &Path, out: &mut Vec<(PathBuf, u64, std::time::SystemTime)>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path: PathBuf = entry.path();
        if path.is_dir() {
            collect_entries(&path, out);
        } else if let Ok(meta) = entry.metadata() {
            let mtime: std::time::SystemTime =
                meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            out.push((path, meta.len(), mtime));
        }
    }
}

#[async_trait]
impl RefCacheBackend for FsRefCache {
    async fn get(&self, key: &RefCacheKey) -> Option<Vec<u8>> {
        let path: PathBuf = self.entry_path(key);
        let stored: Vec<u8> = tokio::fs::read(&path).await.ok()?;

        // Refresh mtime so eviction treats this entry as recently used.
        if let Ok(file) = std::fs::OpenOptions::new().write(true).open(&path) {
            let _ = file.set_modified(std::time::SystemTime::now());
        }

        self.unseal(&stored)
    }

    async fn put(&self, key: &RefCacheKey, bytes: &[u8]) {
        let path: PathBuf = self.entry_path(key);
        let Some(parent) = path.parent() else {
            return;
        };
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!(path = %parent.display(), error = %err, "cache dir creation failed");
            return;
        }

        let Some(sealed) = self.seal(bytes) else {
            warn!(key = %key.ref_key, "cache entry encryption failed");
            return;
        };

        // Temp file in the destination directory, then atomic rename.
        let result: std::io::Result<()> = (|| {
            let mut tmp: tempfile::NamedTempFile = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(&sealed)?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                debug!(key = %key.ref_key, bytes = bytes.len(), "cached reference");
                self.evict_to_quota();
            }
            Err(err) => {
                warn!(key = %key.ref_key, error = %err, "cache write failed");
            }
        }
    }

    async fn evict(&self, key: &RefCacheKey) {
        let path: PathBuf = self.entry_path(key);
        let _ = tokio::fs::remove_file(&path).await;
    }

    async fn clear(&self) {
        let _ = tokio::fs::remove_dir_all(&self.root).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(sha: &str) -> RefCacheKey {
        RefCacheKey::new("bucket", "rel/reference.bin", sha.repeat(64))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let cache: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, None);
        let key: RefCacheKey = test_key("a");

        assert!(cache.get(&key).await.is_none());
        cache.put(&key, b"reference bytes").await;
        assert_eq!(cache.get(&key).await.as_deref(), Some(&b"reference bytes"[..]));
    }

    #[tokio::test]
    async fn test_evict_removes_entry() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let cache: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, None);
        let key: RefCacheKey = test_key("b");

        cache.put(&key, b"bytes").await;
        cache.evict(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_encrypted_round_trip() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let cache: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, Some("secret"));
        let key: RefCacheKey = test_key("c");

        cache.put(&key, b"plaintext reference").await;
        assert_eq!(
            cache.get(&key).await.as_deref(),
            Some(&b"plaintext reference"[..])
        );

        // The on-disk form must not contain the plaintext.
        let path: PathBuf = cache.entry_path(&key);
        let raw: Vec<u8> = std::fs::read(&path).unwrap();
        assert_ne!(raw, b"plaintext reference");
        assert!(raw.len() > b"plaintext reference".len());
    }

    #[tokio::test]
    async fn test_wrong_key_fails_to_open() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let key: RefCacheKey = test_key("d");

        let writer: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, Some("secret"));
        writer.put(&key, b"sealed").await;

        let reader: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, Some("other"));
        assert!(reader.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_quota_eviction_drops_oldest() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let cache: FsRefCache = FsRefCache::new(dir.path(), 100, None);

        let old_key: RefCacheKey = test_key("e");
        cache.put(&old_key, &[0u8; 80]).await;

        // Make the first entry strictly older.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let new_key: RefCacheKey = test_key("f");
        cache.put(&new_key, &[0u8; 80]).await;

        assert!(cache.get(&old_key).await.is_none());
        assert!(cache.get(&new_key).await.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let cache: FsRefCache = FsRefCache::new(dir.path(), u64::MAX, None);
        let key: RefCacheKey = test_key("a");

        cache.put(&key, b"bytes").await;
        cache.clear().await;
        assert!(cache.get(&key).await.is_none());
    }
}
