//! The storage engine: end-to-end put/get/head/list/delete protocol.
//!
//! This module composes the classifier, naming policy, delta codec,
//! reference cache, and object store port. Uploads and downloads appear as
//! ordinary object operations to callers; reference selection, delta
//! encoding, reconstruction, and integrity verification happen here.
//!
//! The engine is stateless aside from the reference cache and
//! configuration; operations on independent logical objects may run
//! concurrently. The only write-write race, two puts creating one group's
//! reference, is resolved by a conditional first-write-wins create.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use deltaglider_common::{
    hash::{sha256_bytes, verify_sha256},
    DeltaGliderConfig, DELTA_SUFFIX, REFERENCE_FILENAME, TMP_PREFIX,
};

use crate::cache::{RefCacheKey, ReferenceCache};
use crate::classify::{classify, FileClass};
use crate::codec::{DeltaCodec, GdeltaCodec};
use crate::error::{DeltaError, StoreError};
use crate::naming::{is_reference_key, logical_key, split_key, DeltaSpace};
use crate::response::{
    CopyObjectOutput, DeleteErrorEntry, DeleteObjectsOutput, DeletedObject, GetObjectOutput,
    HeadObjectOutput, ListObjectsV2Output, ListedObject, PutObjectOutput,
};
use crate::traits::{ObjectInfo, ObjectMeta, ObjectStore, PutReceipt};
use crate::types::{
    ObjectKind, PutOperation, PutSummary, StoredMeta, VerifyResult, META_EXPIRES_AT,
};

/// Concurrent HEAD/DELETE requests issued while listing or batch-deleting.
const METADATA_CONCURRENCY: usize = 8;

/// Default page size for listings.
const DEFAULT_MAX_KEYS: usize = 1000;

/// Options for `list_objects`.
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Expose reference objects (administrative tooling only).
    pub include_references: bool,
    /// Page size.
    pub max_keys: usize,
    /// Continue strictly after this storage key.
    pub start_after: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            include_references: false,
            max_keys: DEFAULT_MAX_KEYS,
            start_after: None,
        }
    }
}

/// Aggregate storage statistics for a bucket or prefix.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BucketStats {
    /// Logical objects counted (references excluded).
    pub object_count: u64,
    /// Deltas among them.
    pub delta_count: u64,
    /// Sum of original logical sizes.
    pub logical_bytes: u64,
    /// Sum of stored body sizes, references included.
    pub physical_bytes: u64,
    /// 1 - physical/logical (0 when nothing is stored).
    pub savings_ratio: f64,
}

/// The core storage engine, generic over the object store backend.
pub struct DeltaEngine<S: ObjectStore> {
    /// The store adapter.
    store: Arc<S>,
    /// Binary diff/patch implementation.
    codec: Arc<dyn DeltaCodec>,
    /// Process-local reference cache.
    cache: ReferenceCache,
    /// Engine configuration.
    config: DeltaGliderConfig,
}

impl<S: ObjectStore> DeltaEngine<S> {
    /// Create an engine with the default codec and a cache chosen from config.
    pub fn new(store: S, config: DeltaGliderConfig) -> Self {
        let cache: ReferenceCache = ReferenceCache::from_config(&config);
        Self {
            store: Arc::new(store),
            codec: Arc::new(GdeltaCodec::new()),
            cache,
            config,
        }
    }

    /// Replace the delta codec.
    pub fn with_codec(mut self, codec: impl DeltaCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replace the reference cache.
    pub fn with_cache(mut self, cache: ReferenceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access the reference cache (tests and administrative tooling).
    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    // ------------------------------------------------------------------
    // put
    // ------------------------------------------------------------------

    /// Store an object, choosing reference, delta, or direct representation.
    ///
    /// # Arguments
    /// * `bucket` - Destination bucket
    /// * `key` - Caller-visible logical key (`prefix/filename`)
    /// * `body` - Original logical bytes
    ///
    /// # Returns
    /// The boto3-shaped response plus a put summary for logging/CLI.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
    ) -> Result<(PutObjectOutput, PutSummary), DeltaError> {
        let started: SystemTime = SystemTime::now();
        let (prefix, filename): (&str, &str) = split_key(key);

        if filename == REFERENCE_FILENAME {
            return Err(DeltaError::Config {
                message: format!("'{REFERENCE_FILENAME}' is a reserved object name"),
            });
        }

        let space: DeltaSpace = DeltaSpace::new(bucket, prefix);
        let file_sha256: String = sha256_bytes(body);
        let file_size: u64 = body.len() as u64;
        let class: FileClass = classify(filename, file_size);

        info!(
            bucket,
            key,
            size = file_size,
            class = ?class,
            "put_object"
        );

        let result: (PutObjectOutput, PutSummary) = match class {
            FileClass::Direct | FileClass::SkipSmall => {
                self.put_direct(&space, filename, body, &file_sha256).await?
            }
            FileClass::DeltaCandidate => {
                self.put_candidate(&space, filename, body, &file_sha256)
                    .await?
            }
        };

        let elapsed: Duration = started.elapsed().unwrap_or_default();
        info!(
            bucket,
            key = %result.1.key,
            operation = ?result.1.operation,
            duration_ms = elapsed.as_millis() as u64,
            "put_object complete"
        );
        Ok(result)
    }

    /// Verbatim upload, no delta layer.
    async fn put_direct(
        &self,
        space: &DeltaSpace,
        filename: &str,
        body: &[u8],
        file_sha256: &str,
    ) -> Result<(PutObjectOutput, PutSummary), DeltaError> {
        let storage_key: String = space.direct_key(filename);
        let meta: StoredMeta = StoredMeta::direct(file_sha256, body.len() as u64);

        let receipt: PutReceipt = self
            .store
            .put_object(&space.bucket, &storage_key, body, &meta.to_user_metadata())
            .await?;

        // A re-put may change representation; a completed put leaves exactly
        // one of {key}, {key}.dg behind.
        self.store
            .delete_object(&space.bucket, &format!("{storage_key}{DELTA_SUFFIX}"))
            .await?;

        let summary: PutSummary = PutSummary {
            operation: PutOperation::UploadDirect,
            bucket: space.bucket.clone(),
            key: storage_key,
            file_size: body.len() as u64,
            file_sha256: file_sha256.to_string(),
            delta_size: None,
            delta_ratio: None,
            ref_key: None,
            cache_hit: false,
        };
        Ok((self.put_output(receipt, &meta), summary))
    }

    /// Delta-candidate upload: open the group or encode against its reference.
    async fn put_candidate(
        &self,
        space: &DeltaSpace,
        filename: &str,
        body: &[u8],
        file_sha256: &str,
    ) -> Result<(PutObjectOutput, PutSummary), DeltaError> {
        let ref_key: String = space.reference_key();

        let ref_head: Option<ObjectMeta> =
            self.store.head_object(&space.bucket, &ref_key).await?;

        let ref_meta: StoredMeta = match ref_head {
            Some(head) => StoredMeta::from_user_metadata(&ref_key, &head.user_metadata)?,
            None => {
                // Group is empty: try to materialize this object as its
                // reference. First successful conditional write wins.
                let meta: StoredMeta = StoredMeta::reference(
                    file_sha256,
                    body.len() as u64,
                    space.group_id(filename),
                );
                let created: bool = self
                    .store
                    .put_object_if_absent(
                        &space.bucket,
                        &ref_key,
                        body,
                        &meta.to_user_metadata(),
                    )
                    .await?;

                if created {
                    return self
                        .finish_reference_creation(space, filename, body, file_sha256, &ref_key, meta)
                        .await;
                }

                // Lost the race: observe the winner and proceed as a delta.
                debug!(ref_key = %ref_key, "reference already exists, continuing as delta");
                let head: ObjectMeta = self
                    .store
                    .head_object(&space.bucket, &ref_key)
                    .await?
                    .ok_or_else(|| DeltaError::not_found(&space.bucket, &ref_key))?;
                StoredMeta::from_user_metadata(&ref_key, &head.user_metadata)?
            }
        };

        self.put_delta(space, filename, body, file_sha256, &ref_key, &ref_meta)
            .await
    }

    /// After winning the reference race: seed the cache and write the anchor.
    async fn finish_reference_creation(
        &self,
        space: &DeltaSpace,
        filename: &str,
        body: &[u8],
        file_sha256: &str,
        ref_key: &str,
        ref_meta: StoredMeta,
    ) -> Result<(PutObjectOutput, PutSummary), DeltaError> {
        let cache_key: RefCacheKey = RefCacheKey::new(&space.bucket, ref_key, file_sha256);
        self.cache.insert(&cache_key, body).await;

        // Zero-byte anchor keeps the first filename individually addressable
        // without special-casing list or get.
        let anchor_key: String = space.delta_key(filename);
        let anchor_meta: StoredMeta = StoredMeta::delta(
            file_sha256,
            body.len() as u64,
            ref_key,
            file_sha256,
            0,
        );
        let receipt: PutReceipt = self
            .store
            .put_object(
                &space.bucket,
                &anchor_key,
                &[],
                &anchor_meta.to_user_metadata(),
            )
            .await?;
        self.store
            .delete_object(&space.bucket, &space.direct_key(filename))
            .await?;

        info!(ref_key = %ref_key, anchor = %anchor_key, "created reference");

        let summary: PutSummary = PutSummary {
            operation: PutOperation::CreateReference,
            bucket: space.bucket.clone(),
            key: logical_key(&anchor_key).to_string(),
            file_size: body.len() as u64,
            file_sha256: file_sha256.to_string(),
            delta_size: Some(0),
            delta_ratio: Some(0.0),
            ref_key: Some(ref_key.to_string()),
            cache_hit: false,
        };
        Ok((self.put_output(receipt, &ref_meta), summary))
    }

    /// Encode against the group reference, downgrading when the delta is
    /// larger than `max_ratio` of the original.
    async fn put_delta(
        &self,
        space: &DeltaSpace,
        filename: &str,
        body: &[u8],
        file_sha256: &str,
        ref_key: &str,
        ref_meta: &StoredMeta,
    ) -> Result<(PutObjectOutput, PutSummary), DeltaError> {
        let cache_key: RefCacheKey =
            RefCacheKey::new(&space.bucket, ref_key, &ref_meta.sha256);
        let cache_hit: bool = self.cache.contains(&cache_key).await;

        let store: Arc<S> = self.store.clone();
        let bucket: String = space.bucket.clone();
        let ref_key_owned: String = ref_key.to_string();
        let ref_bytes: Vec<u8> = self
            .cache
            .get_or_populate(&cache_key, || {
                let store: Arc<S> = store.clone();
                let bucket: String = bucket.clone();
                let key: String = ref_key_owned.clone();
                async move { Ok(store.get_object(&bucket, &key).await?) }
            })
            .await?;

        let delta: Vec<u8> = self.codec.diff(&ref_bytes, body)?;
        let file_size: u64 = body.len() as u64;
        let ratio: f64 = delta.len() as f64 / file_size.max(1) as f64;

        // Strictly greater: a delta exactly at the cutoff is accepted.
        if (delta.len() as f64) > self.config.max_ratio * file_size as f64 {
            warn!(
                key = %space.direct_key(filename),
                ratio = format!("{ratio:.3}"),
                max_ratio = self.config.max_ratio,
                "delta exceeds ratio cutoff, storing direct"
            );
            return self.put_direct(space, filename, body, file_sha256).await;
        }

        let delta_key: String = space.delta_key(filename);
        let meta: StoredMeta = StoredMeta::delta(
            file_sha256,
            file_size,
            ref_key,
            &ref_meta.sha256,
            delta.len() as u64,
        );
        let receipt: PutReceipt = self
            .store
            .put_object(&space.bucket, &delta_key, &delta, &meta.to_user_metadata())
            .await?;

        // Remove a stale direct sibling from an earlier downgraded put.
        self.store
            .delete_object(&space.bucket, &space.direct_key(filename))
            .await?;

        debug!(
            key = %delta_key,
            delta_size = delta.len(),
            ratio = format!("{ratio:.3}"),
            "created delta"
        );

        let summary: PutSummary = PutSummary {
            operation: PutOperation::CreateDelta,
            bucket: space.bucket.clone(),
            key: logical_key(&delta_key).to_string(),
            file_size,
            file_sha256: file_sha256.to_string(),
            delta_size: Some(delta.len() as u64),
            delta_ratio: Some(ratio),
            ref_key: Some(ref_key.to_string()),
            cache_hit,
        };
        Ok((self.put_output(receipt, &meta), summary))
    }

    fn put_output(&self, receipt: PutReceipt, meta: &StoredMeta) -> PutObjectOutput {
        PutObjectOutput {
            e_tag: receipt.etag,
            version_id: receipt.version_id,
            metadata: meta.to_external_metadata(),
        }
    }

    // ------------------------------------------------------------------
    // get
    // ------------------------------------------------------------------

    /// Download and reconstruct an object's logical bytes.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput, DeltaError> {
        let (storage_key, head): (String, ObjectMeta) = self.resolve_variant(bucket, key).await?;

        // Objects written by other tools pass through untouched.
        if !StoredMeta::is_deltaglider_object(&head.user_metadata) {
            debug!(bucket, key, "regular object without DeltaGlider metadata");
            let body: Vec<u8> = self.store.get_object(bucket, &storage_key).await?;
            let e_tag: String = sha256_bytes(&body);
            return Ok(GetObjectOutput {
                content_length: body.len() as u64,
                e_tag,
                metadata: HashMap::new(),
                body,
            });
        }

        let meta: StoredMeta = StoredMeta::from_user_metadata(&storage_key, &head.user_metadata)?;
        let body: Vec<u8> = match meta.kind {
            ObjectKind::Direct | ObjectKind::Reference => {
                let body: Vec<u8> = self.store.get_object(bucket, &storage_key).await?;
                if !verify_sha256(&body, &meta.sha256) {
                    return Err(DeltaError::IntegrityFailure {
                        key: storage_key,
                        message: "stored body does not match recorded SHA-256".to_string(),
                    });
                }
                body
            }
            ObjectKind::Delta => self.reconstruct(bucket, &storage_key, &meta).await?,
        };

        Ok(GetObjectOutput {
            content_length: body.len() as u64,
            e_tag: meta.sha256.clone(),
            metadata: meta.to_external_metadata(),
            body,
        })
    }

    /// Apply a delta to its reference, verifying everything on the way.
    async fn reconstruct(
        &self,
        bucket: &str,
        storage_key: &str,
        meta: &StoredMeta,
    ) -> Result<Vec<u8>, DeltaError> {
        let ref_key: &str =
            meta.ref_key
                .as_deref()
                .ok_or_else(|| DeltaError::InvalidMetadata {
                    key: storage_key.to_string(),
                    message: "delta missing reference key".to_string(),
                })?;
        let ref_sha256: &str =
            meta.ref_sha256
                .as_deref()
                .ok_or_else(|| DeltaError::InvalidMetadata {
                    key: storage_key.to_string(),
                    message: "delta missing reference hash".to_string(),
                })?;

        let cache_key: RefCacheKey = RefCacheKey::new(bucket, ref_key, ref_sha256);
        let store: Arc<S> = self.store.clone();
        let bucket_owned: String = bucket.to_string();
        let ref_key_owned: String = ref_key.to_string();
        let ref_bytes: Vec<u8> = self
            .cache
            .get_or_populate(&cache_key, || {
                let store: Arc<S> = store.clone();
                let bucket: String = bucket_owned.clone();
                let key: String = ref_key_owned.clone();
                async move { Ok(store.get_object(&bucket, &key).await?) }
            })
            .await?;

        // A zero-length delta is an anchor: the logical bytes are the
        // reference itself.
        let reconstructed: Vec<u8> = if meta.delta_size == Some(0) {
            ref_bytes
        } else {
            let delta_body: Vec<u8> = self.store.get_object(bucket, storage_key).await?;
            self.codec.patch(&ref_bytes, &delta_body)?
        };

        if reconstructed.len() as u64 != meta.size {
            self.cache.evict(&cache_key).await;
            return Err(DeltaError::IntegrityFailure {
                key: storage_key.to_string(),
                message: format!(
                    "reconstructed length {} != recorded {}",
                    reconstructed.len(),
                    meta.size
                ),
            });
        }
        if !verify_sha256(&reconstructed, &meta.sha256) {
            self.cache.evict(&cache_key).await;
            return Err(DeltaError::IntegrityFailure {
                key: storage_key.to_string(),
                message: "reconstructed bytes do not match recorded SHA-256".to_string(),
            });
        }

        Ok(reconstructed)
    }

    /// Resolve `{key}` / `{key}.dg` to exactly one stored variant.
    async fn resolve_variant(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(String, ObjectMeta), DeltaError> {
        let delta_variant: String = format!("{key}{DELTA_SUFFIX}");
        let direct_head: Option<ObjectMeta> = self.store.head_object(bucket, key).await?;
        let delta_head: Option<ObjectMeta> =
            self.store.head_object(bucket, &delta_variant).await?;

        match (direct_head, delta_head) {
            (Some(_), Some(_)) => Err(DeltaError::StorageInconsistency {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            (Some(head), None) => Ok((key.to_string(), head)),
            (None, Some(head)) => Ok((delta_variant, head)),
            (None, None) => Err(DeltaError::not_found(bucket, key)),
        }
    }

    // ------------------------------------------------------------------
    // head
    // ------------------------------------------------------------------

    /// Return logical metadata without reconstructing anything.
    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<HeadObjectOutput, DeltaError> {
        let (storage_key, head): (String, ObjectMeta) = self.resolve_variant(bucket, key).await?;

        if !StoredMeta::is_deltaglider_object(&head.user_metadata) {
            return Ok(HeadObjectOutput {
                content_length: head.size,
                e_tag: head.etag.unwrap_or_default(),
                last_modified: head.last_modified,
                metadata: HashMap::new(),
            });
        }

        let meta: StoredMeta = StoredMeta::from_user_metadata(&storage_key, &head.user_metadata)?;
        Ok(HeadObjectOutput {
            content_length: meta.size,
            e_tag: meta.sha256.clone(),
            last_modified: head.last_modified,
            metadata: meta.to_external_metadata(),
        })
    }

    // ------------------------------------------------------------------
    // list
    // ------------------------------------------------------------------

    /// List the caller-visible logical namespace under a prefix.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> Result<ListObjectsV2Output, DeltaError> {
        let page = self
            .store
            .list_objects(
                bucket,
                prefix,
                options.start_after.as_deref(),
                options.max_keys,
            )
            .await?;

        // Fetch stored metadata for every entry with bounded concurrency;
        // listings alone carry no user metadata.
        let described: Vec<(ObjectInfo, Option<StoredMeta>)> = stream::iter(page.objects)
            .map(|info: ObjectInfo| {
                let store: Arc<S> = self.store.clone();
                let bucket: String = bucket.to_string();
                async move {
                    let meta: Option<StoredMeta> = match store
                        .head_object(&bucket, &info.key)
                        .await
                    {
                        Ok(Some(head)) => {
                            StoredMeta::from_user_metadata(&info.key, &head.user_metadata).ok()
                        }
                        _ => None,
                    };
                    (info, meta)
                }
            })
            .buffer_unordered(METADATA_CONCURRENCY)
            .collect()
            .await;

        let mut contents: Vec<ListedObject> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // Delta entries first so the anchor's metadata wins a logical-name
        // collision against a stray direct sibling.
        let (deltas, others): (Vec<_>, Vec<_>) = described
            .into_iter()
            .partition(|(info, _)| info.key.ends_with(DELTA_SUFFIX));

        for (info, meta) in deltas.into_iter().chain(others) {
            if is_reference_key(&info.key) && !options.include_references {
                continue;
            }
            if info.key.starts_with(TMP_PREFIX) {
                continue;
            }

            let logical: String = logical_key(&info.key).to_string();
            if !seen.insert(logical.clone()) {
                continue;
            }

            let entry: ListedObject = match meta {
                Some(meta) => ListedObject {
                    key: logical,
                    size: meta.size,
                    last_modified: info.last_modified,
                    e_tag: Some(meta.sha256.clone()),
                    metadata: meta.to_external_metadata(),
                },
                // Object written by another tool: surface it untouched.
                None => ListedObject {
                    key: logical,
                    size: info.size,
                    last_modified: info.last_modified,
                    e_tag: info.etag,
                    metadata: HashMap::new(),
                },
            };
            contents.push(entry);
        }

        contents.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(ListObjectsV2Output {
            name: bucket.to_string(),
            prefix: prefix.to_string(),
            key_count: contents.len(),
            contents,
            is_truncated: page.is_truncated,
            next_continuation_token: page.next_start_after,
        })
    }

    // ------------------------------------------------------------------
    // delete
    // ------------------------------------------------------------------

    /// Delete a logical key: both `{key}` and `{key}.dg` when present.
    ///
    /// The group reference is not caller-addressable and is never touched;
    /// use `purge_group` to retire a whole group.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), DeltaError> {
        if is_reference_key(key) {
            return Err(DeltaError::not_found(bucket, key));
        }

        info!(bucket, key, "delete_object");
        self.store.delete_object(bucket, key).await?;
        self.store
            .delete_object(bucket, &format!("{key}{DELTA_SUFFIX}"))
            .await?;
        Ok(())
    }

    /// Batch delete with per-key error isolation.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<DeleteObjectsOutput, DeltaError> {
        let results: Vec<(String, Result<(), DeltaError>)> = stream::iter(keys.to_vec())
            .map(|key: String| async move {
                let result: Result<(), DeltaError> = self.delete_object(bucket, &key).await;
                (key, result)
            })
            .buffer_unordered(METADATA_CONCURRENCY)
            .collect()
            .await;

        let mut output: DeleteObjectsOutput = DeleteObjectsOutput::default();
        for (key, result) in results {
            match result {
                Ok(()) => output.deleted.push(DeletedObject { key }),
                Err(err) => output.errors.push(DeleteErrorEntry {
                    key,
                    message: err.to_string(),
                }),
            }
        }
        Ok(output)
    }

    /// Retire a group's reference after verifying no delta still names it.
    ///
    /// # Errors
    /// `ReferencedByDeltas` while any delta under the prefix points at the
    /// reference; `ObjectNotFound` when the group has no reference.
    pub async fn purge_group(&self, bucket: &str, prefix: &str) -> Result<(), DeltaError> {
        let space: DeltaSpace = DeltaSpace::new(bucket, prefix);
        let ref_key: String = space.reference_key();

        let ref_head: Option<ObjectMeta> = self.store.head_object(bucket, &ref_key).await?;
        let Some(ref_head) = ref_head else {
            return Err(DeltaError::not_found(bucket, &ref_key));
        };

        let dependents: usize = self.count_dependent_deltas(bucket, &space, &ref_key).await?;
        if dependents > 0 {
            return Err(DeltaError::ReferencedByDeltas {
                ref_key,
                delta_count: dependents,
            });
        }

        self.store.delete_object(bucket, &ref_key).await?;

        if let Some(sha) = ref_head.user_metadata.get(crate::types::META_SHA256) {
            let cache_key: RefCacheKey = RefCacheKey::new(bucket, &ref_key, sha);
            self.cache.evict(&cache_key).await;
        }
        info!(bucket, ref_key = %ref_key, "purged group reference");
        Ok(())
    }

    /// Count deltas under a prefix whose metadata names `ref_key`.
    async fn count_dependent_deltas(
        &self,
        bucket: &str,
        space: &DeltaSpace,
        ref_key: &str,
    ) -> Result<usize, DeltaError> {
        let list_prefix: String = if space.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", space.prefix)
        };

        let mut count: usize = 0;
        let mut start_after: Option<String> = None;
        loop {
            let page = self
                .store
                .list_objects(bucket, &list_prefix, start_after.as_deref(), DEFAULT_MAX_KEYS)
                .await?;

            let delta_keys: Vec<String> = page
                .objects
                .iter()
                .filter(|info| info.key.ends_with(DELTA_SUFFIX))
                .map(|info| info.key.clone())
                .collect();

            let heads: Vec<Option<ObjectMeta>> = stream::iter(delta_keys)
                .map(|key: String| {
                    let store: Arc<S> = self.store.clone();
                    let bucket: String = bucket.to_string();
                    async move { store.head_object(&bucket, &key).await.ok().flatten() }
                })
                .buffer_unordered(METADATA_CONCURRENCY)
                .collect()
                .await;

            count += heads
                .into_iter()
                .flatten()
                .filter(|head| {
                    head.user_metadata.get(crate::types::META_REF_KEY).map(String::as_str)
                        == Some(ref_key)
                })
                .count();

            if !page.is_truncated {
                break;
            }
            start_after = page.next_start_after;
            if start_after.is_none() {
                break;
            }
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // copy
    // ------------------------------------------------------------------

    /// Delta-aware copy. Direct objects copy server-side; anything with a
    /// delta layer is reconstructed and re-put under the destination space.
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<CopyObjectOutput, DeltaError> {
        let (storage_key, head): (String, ObjectMeta) =
            self.resolve_variant(src_bucket, src_key).await?;

        let is_plain: bool = !StoredMeta::is_deltaglider_object(&head.user_metadata)
            || head
                .user_metadata
                .get(crate::types::META_KIND)
                .map(String::as_str)
                == Some("direct");

        if is_plain && storage_key == src_key {
            self.store
                .copy_object(src_bucket, &storage_key, dst_bucket, dst_key)
                .await?;
            return Ok(CopyObjectOutput { e_tag: None });
        }

        let source: GetObjectOutput = self.get_object(src_bucket, src_key).await?;
        let (output, _summary): (PutObjectOutput, PutSummary) =
            self.put_object(dst_bucket, dst_key, &source.body).await?;
        Ok(CopyObjectOutput { e_tag: output.e_tag })
    }

    // ------------------------------------------------------------------
    // stats / verify
    // ------------------------------------------------------------------

    /// Aggregate logical-vs-physical statistics for a bucket or prefix.
    pub async fn stats(&self, bucket: &str, prefix: &str) -> Result<BucketStats, DeltaError> {
        let mut stats: BucketStats = BucketStats::default();
        let mut start_after: Option<String> = None;

        loop {
            let page = self
                .store
                .list_objects(bucket, prefix, start_after.as_deref(), DEFAULT_MAX_KEYS)
                .await?;

            let described: Vec<(ObjectInfo, Option<StoredMeta>)> = stream::iter(page.objects)
                .map(|info: ObjectInfo| {
                    let store: Arc<S> = self.store.clone();
                    let bucket: String = bucket.to_string();
                    async move {
                        let meta: Option<StoredMeta> =
                            match store.head_object(&bucket, &info.key).await {
                                Ok(Some(head)) => {
                                    StoredMeta::from_user_metadata(&info.key, &head.user_metadata)
                                        .ok()
                                }
                                _ => None,
                            };
                        (info, meta)
                    }
                })
                .buffer_unordered(METADATA_CONCURRENCY)
                .collect()
                .await;

            for (info, meta) in described {
                if info.key.starts_with(TMP_PREFIX) {
                    continue;
                }
                stats.physical_bytes += info.size;
                match meta {
                    Some(meta) if meta.kind == ObjectKind::Reference => {
                        // Physical cost only; not a logical object.
                    }
                    Some(meta) => {
                        stats.object_count += 1;
                        stats.logical_bytes += meta.size;
                        if meta.kind == ObjectKind::Delta {
                            stats.delta_count += 1;
                        }
                    }
                    None => {
                        stats.object_count += 1;
                        stats.logical_bytes += info.size;
                    }
                }
            }

            if !page.is_truncated {
                break;
            }
            start_after = page.next_start_after;
            if start_after.is_none() {
                break;
            }
        }

        if stats.logical_bytes > 0 {
            stats.savings_ratio = 1.0 - (stats.physical_bytes as f64 / stats.logical_bytes as f64);
        }
        Ok(stats)
    }

    /// Reconstruct an object and re-verify its recorded identity.
    pub async fn verify(&self, bucket: &str, key: &str) -> Result<VerifyResult, DeltaError> {
        let head: HeadObjectOutput = self.head_object(bucket, key).await?;
        if head.metadata.is_empty() {
            // Not written by DeltaGlider; nothing recorded to verify against.
            let output: GetObjectOutput = self.get_object(bucket, key).await?;
            let actual: String = sha256_bytes(&output.body);
            return Ok(VerifyResult {
                valid: true,
                expected_sha256: actual.clone(),
                actual_sha256: actual,
            });
        }
        let expected: String = head.e_tag;

        let output: GetObjectOutput = match self.get_object(bucket, key).await {
            Ok(output) => output,
            Err(DeltaError::IntegrityFailure { .. }) | Err(DeltaError::ReferenceCorrupt { .. }) => {
                return Ok(VerifyResult {
                    valid: false,
                    expected_sha256: expected,
                    actual_sha256: String::new(),
                })
            }
            Err(err) => return Err(err),
        };

        let actual: String = sha256_bytes(&output.body);
        Ok(VerifyResult {
            valid: actual == expected,
            expected_sha256: expected,
            actual_sha256: actual,
        })
    }

    // ------------------------------------------------------------------
    // rehydration
    // ------------------------------------------------------------------

    /// Reconstruct a delta-compressed object into `.deltaglider/tmp/` for
    /// plain-S3 consumers, with an expiry recorded in metadata.
    ///
    /// Returns the temporary key, or None when the object has no delta
    /// layer (callers can hand out the original key directly).
    pub async fn rehydrate_for_download(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<Option<String>, DeltaError> {
        let (storage_key, _head): (String, ObjectMeta) = self.resolve_variant(bucket, key).await?;
        if !storage_key.ends_with(DELTA_SUFFIX) {
            return Ok(None);
        }

        let output: GetObjectOutput = self.get_object(bucket, key).await?;
        let (_, filename): (&str, &str) = split_key(key);
        let tmp_key: String = format!("{TMP_PREFIX}{}_{filename}", &output.e_tag[..16]);

        let expires_at: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            + expires_in.as_secs();

        let meta: StoredMeta = StoredMeta::direct(&output.e_tag, output.content_length);
        let mut user_metadata: HashMap<String, String> = meta.to_user_metadata();
        user_metadata.insert(META_EXPIRES_AT.to_string(), expires_at.to_string());

        self.store
            .put_object(bucket, &tmp_key, &output.body, &user_metadata)
            .await?;

        info!(bucket, key, tmp_key = %tmp_key, "rehydrated");
        Ok(Some(tmp_key))
    }

    /// Delete expired objects under `.deltaglider/tmp/`.
    ///
    /// # Returns
    /// Number of objects deleted.
    pub async fn purge_tmp(&self, bucket: &str) -> Result<u64, DeltaError> {
        let now: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut deleted: u64 = 0;
        let mut start_after: Option<String> = None;
        loop {
            let page = self
                .store
                .list_objects(bucket, TMP_PREFIX, start_after.as_deref(), DEFAULT_MAX_KEYS)
                .await?;

            for info in &page.objects {
                let Ok(Some(head)) = self.store.head_object(bucket, &info.key).await else {
                    continue;
                };
                let Some(expires_raw) = head.user_metadata.get(META_EXPIRES_AT) else {
                    continue;
                };
                let Ok(expires_at) = expires_raw.parse::<u64>() else {
                    warn!(key = %info.key, value = %expires_raw, "unparseable expiry");
                    continue;
                };
                if expires_at <= now {
                    self.store.delete_object(bucket, &info.key).await?;
                    deleted += 1;
                    debug!(key = %info.key, "purged expired tmp object");
                }
            }

            if !page.is_truncated {
                break;
            }
            start_after = page.next_start_after;
            if start_after.is_none() {
                break;
            }
        }

        info!(bucket, deleted, "tmp purge complete");
        Ok(deleted)
    }
}
