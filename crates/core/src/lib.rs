//! Delta-aware object storage engine.
//!
//! DeltaGlider stores collections of near-identical versioned binary
//! artifacts in an S3-compatible store at a fraction of the naive
//! footprint: per group of similar files, one full "reference" object is
//! kept and every other object is a binary delta against it. Callers see
//! ordinary put/get/head/list/delete semantics; grouping, delta encoding,
//! reconstruction, and integrity verification are internal.
//!
//! # Architecture
//!
//! The engine depends on two injection points:
//!
//! - [`ObjectStore`] - `get/put/head/list/delete/copy` over an
//!   S3-compatible service with user metadata (see `deltaglider-s3` for
//!   the AWS SDK adapter)
//! - [`DeltaCodec`] - deterministic, reversible binary diff/patch
//!   (defaults to [`GdeltaCodec`])
//!
//! # Example
//!
//! ```ignore
//! use deltaglider_core::{DeltaEngine, ListOptions};
//! use deltaglider_common::DeltaGliderConfig;
//!
//! let engine = DeltaEngine::new(store, DeltaGliderConfig::from_env()?);
//! let (output, summary) = engine.put_object("bucket", "rel/v1.0.0.zip", &bytes).await?;
//! let object = engine.get_object("bucket", "rel/v1.0.0.zip").await?;
//! assert_eq!(object.body, bytes);
//! ```

pub mod analyze;
pub mod cache;
mod classify;
mod codec;
mod engine;
mod error;
mod naming;
mod response;
mod traits;
mod types;

pub use analyze::{analyze_bucket, BucketAnalysis, GroupEstimate};
pub use cache::{FsRefCache, MemoryRefCache, RefCacheBackend, RefCacheKey, ReferenceCache};
pub use classify::{classify, extension_cluster, family, FileClass};
pub use codec::{DeltaCodec, GdeltaCodec};
pub use engine::{BucketStats, DeltaEngine, ListOptions};
pub use error::{CodecError, DeltaError, StoreError};
pub use naming::{is_reference_key, join_key, logical_key, split_key, DeltaSpace, S3Url};
pub use response::{
    CopyObjectOutput, DeleteErrorEntry, DeleteObjectsOutput, DeletedObject, GetObjectOutput,
    HeadObjectOutput, ListObjectsV2Output, ListedObject, PutObjectOutput,
};
pub use traits::{ObjectInfo, ObjectMeta, ObjectPage, ObjectStore, PutReceipt};
pub use types::{
    ObjectKind, PutOperation, PutSummary, StoredMeta, VerifyResult, META_COMPRESSION_RATIO,
    META_DELTA_SIZE, META_EXPIRES_AT, META_GROUP_ID, META_KIND, META_REF_KEY, META_REF_SHA256,
    META_SHA256, META_SIZE, META_TOOL_VERSION,
};
