//! Error types for the storage engine.

use thiserror::Error;

/// Errors from the underlying object store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Object not found in the store.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Transient failure (timeout, 5xx, throttling). Retried by the adapter;
    /// surfaces only after retries are exhausted.
    #[error("Transient store error after {attempts} attempt(s): {message}")]
    Transient { message: String, attempts: u32 },

    /// Permanent failure (4xx other than 404).
    #[error("Store rejected request ({status}): {message}")]
    Permanent { status: u16, message: String },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Invalid configuration.
    #[error("Invalid store configuration: {message}")]
    InvalidConfig { message: String },
}

impl StoreError {
    /// Check if this error may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum DeltaError {
    /// Missing credentials, unreadable cache dir. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No variant of the requested key exists.
    #[error("Object not found: s3://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Both `{key}` and `{key}.dg` exist; never silently pick one.
    #[error("Storage inconsistency for s3://{bucket}/{key}: both direct and delta variants exist")]
    StorageInconsistency { bucket: String, key: String },

    /// Reconstructed bytes fail the SHA-256 or length check.
    #[error("Integrity failure for {key}: {message}")]
    IntegrityFailure { key: String, message: String },

    /// Reference body fails SHA-256 after the single automatic re-download.
    #[error("Reference corrupt: {ref_key} (expected sha256 {expected})")]
    ReferenceCorrupt { ref_key: String, expected: String },

    /// Attempted reference deletion while deltas still name it.
    #[error("Reference {ref_key} still referenced by {delta_count} delta(s)")]
    ReferencedByDeltas { ref_key: String, delta_count: usize },

    /// Stored metadata missing or malformed.
    #[error("Invalid object metadata on {key}: {message}")]
    InvalidMetadata { key: String, message: String },

    /// Delta encode/decode failure.
    #[error("Delta codec error: {message}")]
    Codec { message: String },

    /// Propagated store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local I/O failure outside the store adapter.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },
}

impl DeltaError {
    /// Build an `ObjectNotFound` for a bucket/key pair.
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Build an `Io` error from a path and `std::io::Error`.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors from the delta codec port.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Encoding the delta failed.
    #[error("Delta encode failed: {0}")]
    Encode(String),

    /// Applying the delta failed.
    #[error("Delta decode failed: {0}")]
    Decode(String),
}

impl From<CodecError> for DeltaError {
    fn from(err: CodecError) -> Self {
        DeltaError::Codec {
            message: err.to_string(),
        }
    }
}
