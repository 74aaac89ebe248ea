//! Object store port - implemented by each backend.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;

/// Metadata about a stored object from head operations.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Physical size of the stored body in bytes.
    pub size: u64,
    /// ETag as reported by the store.
    pub etag: Option<String>,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// User metadata attached at write time.
    pub user_metadata: HashMap<String, String>,
}

/// Summary entry from list operations.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Full storage key.
    pub key: String,
    /// Physical size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub last_modified: Option<i64>,
    /// ETag as reported by the store.
    pub etag: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Objects in key order.
    pub objects: Vec<ObjectInfo>,
    /// Whether more results follow this page.
    pub is_truncated: bool,
    /// Key to pass as `start_after` for the next page.
    pub next_start_after: Option<String>,
}

/// Receipt for a completed put.
#[derive(Debug, Clone, Default)]
pub struct PutReceipt {
    /// ETag assigned by the store.
    pub etag: Option<String>,
    /// Version id when the bucket is versioned.
    pub version_id: Option<String>,
}

/// Low-level object store operations - implemented by each backend.
///
/// The engine depends only on this capability set; any S3-compatible
/// provider (AWS, MinIO, R2) satisfying it is acceptable.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check if an object exists and return its metadata.
    /// Returns None if the object doesn't exist.
    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectMeta>, StoreError>;

    /// Download an object body to bytes.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Upload bytes with user metadata, overwriting any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Result<PutReceipt, StoreError>;

    /// Conditional create (`If-None-Match: *`).
    ///
    /// Returns `Ok(true)` when this call created the object, `Ok(false)`
    /// when the key already existed. Used to resolve the reference-creation
    /// race with first-write-wins semantics.
    async fn put_object_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &HashMap<String, String>,
    ) -> Result<bool, StoreError>;

    /// List objects under a prefix, starting strictly after `start_after`.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, StoreError>;

    /// Delete an object. Deleting a nonexistent key is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Server-side copy without body transfer.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StoreError>;
}
