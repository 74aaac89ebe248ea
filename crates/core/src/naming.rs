//! Grouping and key naming policy.
//!
//! Grouping is purely path/extension driven; the engine never derives group
//! identity from file content. One reference exists per (prefix, family),
//! stored at `{prefix}/reference.bin`, and every delta body lives at the
//! logical key plus a `.dg` suffix.

use deltaglider_common::{DELTA_SUFFIX, REFERENCE_FILENAME};

use crate::classify::family;
use crate::error::DeltaError;

/// A (bucket, prefix) pair: the namespace one group's objects share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeltaSpace {
    /// Bucket name.
    pub bucket: String,
    /// Storage prefix, no trailing slash. Empty for bucket root.
    pub prefix: String,
}

impl DeltaSpace {
    /// Create a delta space, normalizing away a trailing slash.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            bucket: bucket.into(),
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// The canonical reference key for this space.
    pub fn reference_key(&self) -> String {
        join_key(&self.prefix, REFERENCE_FILENAME)
    }

    /// Storage key of a delta body for `filename`.
    pub fn delta_key(&self, filename: &str) -> String {
        format!("{}{}", self.direct_key(filename), DELTA_SUFFIX)
    }

    /// Storage key of a direct object for `filename`.
    pub fn direct_key(&self, filename: &str) -> String {
        join_key(&self.prefix, filename)
    }

    /// Stable group identity for `filename`'s family.
    pub fn group_id(&self, filename: &str) -> String {
        format!("{}::{}", self.prefix, family(filename))
    }
}

/// Split a full storage key into (prefix, filename).
pub fn split_key(key: &str) -> (&str, &str) {
    match key.rsplit_once('/') {
        Some((prefix, filename)) => (prefix, filename),
        None => ("", key),
    }
}

/// Join a prefix and filename into a storage key.
pub fn join_key(prefix: &str, filename: &str) -> String {
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}

/// Strip the delta suffix, yielding the caller-visible logical key.
pub fn logical_key(storage_key: &str) -> &str {
    storage_key.strip_suffix(DELTA_SUFFIX).unwrap_or(storage_key)
}

/// Whether a storage key names a group reference object.
pub fn is_reference_key(key: &str) -> bool {
    let (_, filename): (&str, &str) = split_key(key);
    filename == REFERENCE_FILENAME
}

/// A parsed `s3://bucket/key` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    /// Bucket name.
    pub bucket: String,
    /// Key or prefix; may be empty for bucket root.
    pub key: String,
}

impl S3Url {
    /// Parse an `s3://bucket[/key]` URL.
    ///
    /// # Errors
    /// Returns `DeltaError::Config` on a missing scheme or empty bucket.
    pub fn parse(url: &str) -> Result<Self, DeltaError> {
        let rest: &str = url.strip_prefix("s3://").ok_or_else(|| DeltaError::Config {
            message: format!("invalid S3 URL (expected s3://bucket/key): {url}"),
        })?;

        let (bucket, key): (&str, &str) = match rest.split_once('/') {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(DeltaError::Config {
                message: format!("invalid S3 URL (empty bucket): {url}"),
            });
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// The delta space containing this URL's key.
    pub fn delta_space(&self) -> DeltaSpace {
        let (prefix, _): (&str, &str) = split_key(&self.key);
        DeltaSpace::new(&self.bucket, prefix)
    }
}

impl std::fmt::Display for S3Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "s3://{}", self.bucket)
        } else {
            write!(f, "s3://{}/{}", self.bucket, self.key)
        }
    }
}
