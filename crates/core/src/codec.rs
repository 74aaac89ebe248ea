//! Delta codec port and the default gdelta-backed implementation.
//!
//! The engine only requires determinism and reversibility:
//! `patch(base, diff(base, target)) == target` bit-for-bit. Alternative
//! codecs (bsdiff, zstd --patch-from) can be dropped in behind the trait.

use crate::error::CodecError;

/// Binary diff/patch over two byte sequences.
pub trait DeltaCodec: Send + Sync {
    /// Produce a delta blob that reconstructs `target` from `base`.
    fn diff(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Apply a delta blob to `base`, reconstructing the original target.
    fn patch(&self, base: &[u8], delta: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Default codec backed by the `gdelta` crate (GEAR rolling-hash matching,
/// copy/literal instruction stream).
#[derive(Debug, Clone, Copy, Default)]
pub struct GdeltaCodec;

impl GdeltaCodec {
    /// Create the default codec.
    pub fn new() -> Self {
        Self
    }
}

impl DeltaCodec for GdeltaCodec {
    fn diff(&self, base: &[u8], target: &[u8]) -> Result<Vec<u8>, CodecError> {
        gdelta::encode(target, base).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn patch(&self, base: &[u8], delta: &[u8]) -> Result<Vec<u8>, CodecError> {
        gdelta::decode(delta, base).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
