//! Boto3-shaped response types.
//!
//! Top-level field names serialize to the standard S3 response names, so a
//! reader unaware of DeltaGlider sees a conformant response. All
//! DeltaGlider-specific information lives inside `Metadata` under the
//! `deltaglider-` namespace.

use std::collections::HashMap;

use serde::Serialize;

/// Response to `put_object`.
#[derive(Debug, Clone, Serialize)]
pub struct PutObjectOutput {
    /// Entity tag assigned by the store.
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    /// Version id when the bucket is versioned.
    #[serde(rename = "VersionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// User metadata, `deltaglider-` namespaced.
    #[serde(rename = "Metadata")]
    pub metadata: HashMap<String, String>,
}

/// Response to `get_object`.
#[derive(Debug, Clone)]
pub struct GetObjectOutput {
    /// The reconstructed logical bytes.
    pub body: Vec<u8>,
    /// Logical content length (equals `body.len()`).
    pub content_length: u64,
    /// Strong entity tag: hex SHA-256 of the logical bytes.
    pub e_tag: String,
    /// User metadata, `deltaglider-` namespaced.
    pub metadata: HashMap<String, String>,
}

/// Response to `head_object`.
#[derive(Debug, Clone, Serialize)]
pub struct HeadObjectOutput {
    /// Logical content length (original bytes, not the stored body).
    #[serde(rename = "ContentLength")]
    pub content_length: u64,
    /// Strong entity tag: hex SHA-256 of the logical bytes.
    #[serde(rename = "ETag")]
    pub e_tag: String,
    /// Last modified timestamp (Unix epoch seconds).
    #[serde(rename = "LastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    /// User metadata, `deltaglider-` namespaced.
    #[serde(rename = "Metadata")]
    pub metadata: HashMap<String, String>,
}

/// One entry in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListedObject {
    /// Caller-visible logical key (never ends in `.dg`).
    #[serde(rename = "Key")]
    pub key: String,
    /// Logical size in bytes.
    #[serde(rename = "Size")]
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    #[serde(rename = "LastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    /// Entity tag.
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    /// User metadata, `deltaglider-` namespaced.
    #[serde(rename = "Metadata")]
    pub metadata: HashMap<String, String>,
}

/// Response to `list_objects` (v2 shape).
#[derive(Debug, Clone, Serialize)]
pub struct ListObjectsV2Output {
    /// Bucket name.
    #[serde(rename = "Name")]
    pub name: String,
    /// Listing prefix.
    #[serde(rename = "Prefix")]
    pub prefix: String,
    /// Entries in key order.
    #[serde(rename = "Contents")]
    pub contents: Vec<ListedObject>,
    /// Number of entries in this page.
    #[serde(rename = "KeyCount")]
    pub key_count: usize,
    /// Whether more results follow.
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    /// Token to continue the listing.
    #[serde(rename = "NextContinuationToken", skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

/// Successfully deleted key in a batch delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedObject {
    /// The logical key that was deleted.
    #[serde(rename = "Key")]
    pub key: String,
}

/// Per-key failure in a batch delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteErrorEntry {
    /// The logical key that failed.
    #[serde(rename = "Key")]
    pub key: String,
    /// Failure description.
    #[serde(rename = "Message")]
    pub message: String,
}

/// Response to `delete_objects`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DeleteObjectsOutput {
    /// Keys deleted.
    #[serde(rename = "Deleted")]
    pub deleted: Vec<DeletedObject>,
    /// Keys that failed.
    #[serde(rename = "Errors")]
    pub errors: Vec<DeleteErrorEntry>,
}

/// Response to `copy_object`.
#[derive(Debug, Clone, Serialize)]
pub struct CopyObjectOutput {
    /// Entity tag of the destination object.
    #[serde(rename = "ETag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}
