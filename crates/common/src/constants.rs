//! Shared constants used across deltaglider crates.

/// Files below this size are always stored verbatim (delta overhead dominates).
pub const MIN_DELTA_SIZE: u64 = 1024 * 1024;

/// Default maximum delta/original size ratio before falling back to direct storage.
pub const DEFAULT_MAX_RATIO: f64 = 0.5;

/// Canonical filename of the per-group reference object.
pub const REFERENCE_FILENAME: &str = "reference.bin";

/// Storage-key suffix marking a delta body.
pub const DELTA_SUFFIX: &str = ".dg";

/// Namespace prefix for DeltaGlider fields in caller-visible metadata.
pub const META_PREFIX: &str = "deltaglider-";

/// Bucket prefix holding rehydrated temporary objects.
pub const TMP_PREFIX: &str = ".deltaglider/tmp/";

/// Default byte quota for the filesystem reference cache (2 GiB).
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Default size bound for the in-memory reference cache (100 MiB).
pub const DEFAULT_CACHE_MEMORY_SIZE_MB: u64 = 100;

/// Default retry attempts for transient store errors.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Deadline for metadata operations (HEAD/LIST/DELETE) in seconds.
pub const METADATA_OP_TIMEOUT_SECS: u64 = 60;

/// Deadline for body transfers (GET/PUT of object bodies) in seconds.
pub const BODY_OP_TIMEOUT_SECS: u64 = 30 * 60;

/// Version string written into object metadata by this tool.
pub const TOOL_VERSION: &str = concat!("deltaglider/", env!("CARGO_PKG_VERSION"));
