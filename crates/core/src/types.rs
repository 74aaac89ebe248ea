//! Stored-object metadata vocabulary and operation summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use deltaglider_common::{hash::is_sha256_hex, META_PREFIX, TOOL_VERSION};

use crate::error::DeltaError;

/// Internal metadata key: object kind.
pub const META_KIND: &str = "dg-kind";
/// Internal metadata key: writing tool version.
pub const META_TOOL_VERSION: &str = "dg-tool-version";
/// Internal metadata key: SHA-256 of the original logical bytes.
pub const META_SHA256: &str = "dg-sha256";
/// Internal metadata key: original logical byte length.
pub const META_SIZE: &str = "dg-size";
/// Internal metadata key (deltas): absolute storage key of the reference.
pub const META_REF_KEY: &str = "dg-ref-key";
/// Internal metadata key (deltas): SHA-256 of the reference's bytes.
pub const META_REF_SHA256: &str = "dg-ref-sha256";
/// Internal metadata key (deltas): byte length of the delta blob.
pub const META_DELTA_SIZE: &str = "dg-delta-size";
/// Internal metadata key (deltas): 1 - delta_size/original_size, 6 decimals.
pub const META_COMPRESSION_RATIO: &str = "dg-compression-ratio";
/// Internal metadata key (references): stable group identity.
pub const META_GROUP_ID: &str = "dg-group-id";
/// Internal metadata key (rehydrated tmp objects): expiry instant, RFC 3339.
pub const META_EXPIRES_AT: &str = "dg-expires-at";

/// Physical role of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Base object for a group; body is the original bytes of the first
    /// accepted delta candidate.
    Reference,
    /// Body is a binary diff against a named reference.
    Delta,
    /// Body equals the original bytes, no delta layer.
    Direct,
}

impl ObjectKind {
    /// Wire form used in `dg-kind`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Reference => "reference",
            ObjectKind::Delta => "delta",
            ObjectKind::Direct => "direct",
        }
    }

    /// Parse the wire form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reference" => Some(ObjectKind::Reference),
            "delta" => Some(ObjectKind::Delta),
            "direct" => Some(ObjectKind::Direct),
            _ => None,
        }
    }
}

/// Parsed DeltaGlider metadata of a stored object.
///
/// All recovery data lives here; no manifest database exists. Invariant:
/// `sha256`/`size` always describe the original logical bytes, never the
/// stored body.
#[derive(Debug, Clone)]
pub struct StoredMeta {
    /// Physical role of this object.
    pub kind: ObjectKind,
    /// Version of the tool that wrote the object.
    pub tool_version: String,
    /// SHA-256 of the original logical bytes (hex, 64 chars).
    pub sha256: String,
    /// Original logical byte length.
    pub size: u64,
    /// Absolute storage key of the reference (deltas only).
    pub ref_key: Option<String>,
    /// SHA-256 of the reference's original bytes (deltas only).
    pub ref_sha256: Option<String>,
    /// Byte length of the delta blob (deltas only).
    pub delta_size: Option<u64>,
    /// Group identity (references only).
    pub group_id: Option<String>,
}

impl StoredMeta {
    /// Metadata for a direct object.
    pub fn direct(sha256: impl Into<String>, size: u64) -> Self {
        Self {
            kind: ObjectKind::Direct,
            tool_version: TOOL_VERSION.to_string(),
            sha256: sha256.into(),
            size,
            ref_key: None,
            ref_sha256: None,
            delta_size: None,
            group_id: None,
        }
    }

    /// Metadata for a reference object.
    pub fn reference(sha256: impl Into<String>, size: u64, group_id: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Reference,
            tool_version: TOOL_VERSION.to_string(),
            sha256: sha256.into(),
            size,
            ref_key: None,
            ref_sha256: None,
            delta_size: None,
            group_id: Some(group_id.into()),
        }
    }

    /// Metadata for a delta object (a zero `delta_size` marks an anchor).
    pub fn delta(
        sha256: impl Into<String>,
        size: u64,
        ref_key: impl Into<String>,
        ref_sha256: impl Into<String>,
        delta_size: u64,
    ) -> Self {
        Self {
            kind: ObjectKind::Delta,
            tool_version: TOOL_VERSION.to_string(),
            sha256: sha256.into(),
            size,
            ref_key: Some(ref_key.into()),
            ref_sha256: Some(ref_sha256.into()),
            delta_size: Some(delta_size),
            group_id: None,
        }
    }

    /// Compression ratio for delta objects: `1 - delta_size/size`.
    pub fn compression_ratio(&self) -> Option<f64> {
        let delta_size: u64 = self.delta_size?;
        if self.size == 0 {
            return Some(0.0);
        }
        Some(1.0 - (delta_size as f64 / self.size as f64))
    }

    /// Render as user metadata for a store put.
    pub fn to_user_metadata(&self) -> HashMap<String, String> {
        let mut meta: HashMap<String, String> = HashMap::new();
        meta.insert(META_KIND.to_string(), self.kind.as_str().to_string());
        meta.insert(META_TOOL_VERSION.to_string(), self.tool_version.clone());
        meta.insert(META_SHA256.to_string(), self.sha256.clone());
        meta.insert(META_SIZE.to_string(), self.size.to_string());

        if let Some(ref ref_key) = self.ref_key {
            meta.insert(META_REF_KEY.to_string(), ref_key.clone());
        }
        if let Some(ref ref_sha256) = self.ref_sha256 {
            meta.insert(META_REF_SHA256.to_string(), ref_sha256.clone());
        }
        if let Some(delta_size) = self.delta_size {
            meta.insert(META_DELTA_SIZE.to_string(), delta_size.to_string());
        }
        if let Some(ratio) = self.compression_ratio() {
            meta.insert(META_COMPRESSION_RATIO.to_string(), format!("{:.6}", ratio));
        }
        if let Some(ref group_id) = self.group_id {
            meta.insert(META_GROUP_ID.to_string(), group_id.clone());
        }
        meta
    }

    /// Parse from stored user metadata.
    ///
    /// # Errors
    /// Returns `DeltaError::InvalidMetadata` when required fields are
    /// missing or malformed for the declared kind.
    pub fn from_user_metadata(
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, DeltaError> {
        let invalid = |message: String| DeltaError::InvalidMetadata {
            key: key.to_string(),
            message,
        };

        let kind_raw: &String = metadata
            .get(META_KIND)
            .ok_or_else(|| invalid(format!("missing {META_KIND}")))?;
        let kind: ObjectKind = ObjectKind::parse(kind_raw)
            .ok_or_else(|| invalid(format!("unknown {META_KIND}: {kind_raw}")))?;

        let sha256: String = metadata
            .get(META_SHA256)
            .cloned()
            .ok_or_else(|| invalid(format!("missing {META_SHA256}")))?;
        if !is_sha256_hex(&sha256) {
            return Err(invalid(format!("malformed {META_SHA256}: {sha256:?}")));
        }
        let size: u64 = metadata
            .get(META_SIZE)
            .ok_or_else(|| invalid(format!("missing {META_SIZE}")))?
            .parse()
            .map_err(|_| invalid(format!("unparseable {META_SIZE}")))?;

        let tool_version: String = metadata
            .get(META_TOOL_VERSION)
            .cloned()
            .unwrap_or_default();

        let mut parsed: StoredMeta = StoredMeta {
            kind,
            tool_version,
            sha256,
            size,
            ref_key: metadata.get(META_REF_KEY).cloned(),
            ref_sha256: metadata.get(META_REF_SHA256).cloned(),
            delta_size: None,
            group_id: metadata.get(META_GROUP_ID).cloned(),
        };

        if kind == ObjectKind::Delta {
            parsed.delta_size = Some(
                metadata
                    .get(META_DELTA_SIZE)
                    .ok_or_else(|| invalid(format!("missing {META_DELTA_SIZE}")))?
                    .parse()
                    .map_err(|_| invalid(format!("unparseable {META_DELTA_SIZE}")))?,
            );
            if parsed.ref_key.is_none() {
                return Err(invalid(format!("delta missing {META_REF_KEY}")));
            }
            match parsed.ref_sha256 {
                None => return Err(invalid(format!("delta missing {META_REF_SHA256}"))),
                Some(ref ref_sha256) if !is_sha256_hex(ref_sha256) => {
                    return Err(invalid(format!("malformed {META_REF_SHA256}: {ref_sha256:?}")));
                }
                Some(_) => {}
            }
        }

        Ok(parsed)
    }

    /// Render the caller-visible `Metadata` mapping (`deltaglider-` namespace).
    ///
    /// A reader unaware of DeltaGlider sees a fully conformant S3 response;
    /// these keys are the stable external contract.
    pub fn to_external_metadata(&self) -> HashMap<String, String> {
        let mut meta: HashMap<String, String> = HashMap::new();
        let is_delta: bool = self.kind == ObjectKind::Delta;
        meta.insert(
            format!("{META_PREFIX}is-delta"),
            is_delta.to_string(),
        );
        meta.insert(
            format!("{META_PREFIX}original-size"),
            self.size.to_string(),
        );
        meta.insert(format!("{META_PREFIX}sha256"), self.sha256.clone());
        meta.insert(
            format!("{META_PREFIX}tool-version"),
            self.tool_version.clone(),
        );
        if let Some(ratio) = self.compression_ratio() {
            meta.insert(
                format!("{META_PREFIX}compression-ratio"),
                format!("{:.6}", ratio),
            );
        }
        if let Some(ref ref_key) = self.ref_key {
            meta.insert(format!("{META_PREFIX}ref-key"), ref_key.clone());
        }
        meta
    }

    /// Whether stored metadata on `key` was written by DeltaGlider at all.
    pub fn is_deltaglider_object(metadata: &HashMap<String, String>) -> bool {
        metadata.contains_key(META_SHA256)
    }
}

/// How a put was physically satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOperation {
    /// Object opened a new group and became its reference.
    CreateReference,
    /// Object stored as a delta against an existing reference.
    CreateDelta,
    /// Object stored verbatim.
    UploadDirect,
}

/// Summary of a completed put, for logging and CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct PutSummary {
    /// How the object was stored.
    pub operation: PutOperation,
    /// Bucket written to.
    pub bucket: String,
    /// Caller-visible logical key.
    pub key: String,
    /// Original logical size in bytes.
    pub file_size: u64,
    /// SHA-256 of the original bytes.
    pub file_sha256: String,
    /// Delta blob size (delta puts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_size: Option<u64>,
    /// delta_size / file_size (delta puts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_ratio: Option<f64>,
    /// Reference key this delta depends on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_key: Option<String>,
    /// Whether the reference was already in the local cache.
    pub cache_hit: bool,
}

/// Outcome of an integrity verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    /// Whether reconstructed bytes matched the recorded SHA-256.
    pub valid: bool,
    /// SHA-256 recorded in metadata.
    pub expected_sha256: String,
    /// SHA-256 of the reconstructed bytes.
    pub actual_sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [ObjectKind::Reference, ObjectKind::Delta, ObjectKind::Direct] {
            assert_eq!(ObjectKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::parse("bogus"), None);
    }

    #[test]
    fn test_direct_metadata_round_trip() {
        let meta: StoredMeta = StoredMeta::direct("a".repeat(64), 1234);
        let wire: HashMap<String, String> = meta.to_user_metadata();

        assert_eq!(wire.get(META_KIND).map(String::as_str), Some("direct"));
        assert_eq!(wire.get(META_SIZE).map(String::as_str), Some("1234"));
        assert!(!wire.contains_key(META_REF_KEY));

        let parsed: StoredMeta = StoredMeta::from_user_metadata("k", &wire).unwrap();
        assert_eq!(parsed.kind, ObjectKind::Direct);
        assert_eq!(parsed.size, 1234);
    }

    #[test]
    fn test_delta_metadata_round_trip() {
        let meta: StoredMeta =
            StoredMeta::delta("b".repeat(64), 1000, "rel/reference.bin", "c".repeat(64), 250);
        let wire: HashMap<String, String> = meta.to_user_metadata();

        assert_eq!(
            wire.get(META_COMPRESSION_RATIO).map(String::as_str),
            Some("0.750000")
        );

        let parsed: StoredMeta = StoredMeta::from_user_metadata("k.dg", &wire).unwrap();
        assert_eq!(parsed.kind, ObjectKind::Delta);
        assert_eq!(parsed.delta_size, Some(250));
        assert_eq!(parsed.ref_key.as_deref(), Some("rel/reference.bin"));
    }

    #[test]
    fn test_malformed_sha256_rejected() {
        let meta: StoredMeta = StoredMeta::direct("a".repeat(64), 10);
        let mut wire: HashMap<String, String> = meta.to_user_metadata();
        wire.insert(META_SHA256.to_string(), "abc123".to_string());

        let result: Result<StoredMeta, DeltaError> = StoredMeta::from_user_metadata("k", &wire);
        assert!(matches!(result, Err(DeltaError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_delta_metadata_missing_ref_rejected() {
        let meta: StoredMeta =
            StoredMeta::delta("b".repeat(64), 1000, "rel/reference.bin", "c".repeat(64), 250);
        let mut wire: HashMap<String, String> = meta.to_user_metadata();
        wire.remove(META_REF_KEY);

        let result: Result<StoredMeta, DeltaError> = StoredMeta::from_user_metadata("k.dg", &wire);
        assert!(matches!(result, Err(DeltaError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_external_metadata_namespaced() {
        let meta: StoredMeta =
            StoredMeta::delta("b".repeat(64), 1000, "rel/reference.bin", "c".repeat(64), 100);
        let external: HashMap<String, String> = meta.to_external_metadata();

        assert_eq!(
            external.get("deltaglider-is-delta").map(String::as_str),
            Some("true")
        );
        assert_eq!(
            external.get("deltaglider-original-size").map(String::as_str),
            Some("1000")
        );
        assert_eq!(
            external
                .get("deltaglider-compression-ratio")
                .map(String::as_str),
            Some("0.900000")
        );
        assert!(external.keys().all(|k| k.starts_with("deltaglider-")));
    }

    #[test]
    fn test_anchor_ratio_is_one() {
        let meta: StoredMeta =
            StoredMeta::delta("b".repeat(64), 1000, "rel/reference.bin", "c".repeat(64), 0);
        assert_eq!(meta.compression_ratio(), Some(1.0));
    }
}
