//! Content identity.
//!
//! Every stored object carries the SHA-256 of its original logical bytes
//! in metadata, rendered as 64 lowercase hex characters. That string is
//! the only identity the engine trusts: reconstruction, cache reads, and
//! reference downloads all re-hash and compare against it.

use sha2::{Digest, Sha256};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Wire length of a rendered digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Hex-rendered SHA-256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out: String = String::with_capacity(SHA256_HEX_LEN);
    for byte in digest {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Whether `data` hashes to `expected_hex`.
///
/// Comparison ignores hex case so identities recorded by other tooling
/// still verify. An `expected_hex` that is not a digest at all simply
/// never matches.
pub fn verify_sha256(data: &[u8], expected_hex: &str) -> bool {
    sha256_bytes(data).eq_ignore_ascii_case(expected_hex)
}

/// Whether a metadata value has the shape of a rendered digest.
///
/// Used when parsing stored metadata, so a truncated or mangled identity
/// is rejected at the parse boundary rather than surfacing later as a
/// spurious integrity failure.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Digest of the empty input, per FIPS 180-4 test vectors.
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_known_vectors() {
        assert_eq!(sha256_bytes(b""), EMPTY_SHA256);
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_distinct_content_distinct_identity() {
        assert_ne!(sha256_bytes(b"v1.0.0"), sha256_bytes(b"v1.0.1"));
        assert_eq!(sha256_bytes(b"same"), sha256_bytes(b"same"));
    }

    #[test]
    fn test_verify_accepts_either_case() {
        assert!(verify_sha256(b"", EMPTY_SHA256));
        assert!(verify_sha256(b"", &EMPTY_SHA256.to_ascii_uppercase()));
    }

    #[test]
    fn test_verify_rejects_wrong_or_malformed_expectation() {
        assert!(!verify_sha256(b"payload", EMPTY_SHA256));
        assert!(!verify_sha256(b"payload", ""));
        assert!(!verify_sha256(b"payload", "not-a-digest"));
    }

    #[test]
    fn test_digest_shape_validation() {
        assert!(is_sha256_hex(EMPTY_SHA256));
        assert!(is_sha256_hex(&EMPTY_SHA256.to_ascii_uppercase()));
        assert!(!is_sha256_hex(&EMPTY_SHA256[..63]));
        assert!(!is_sha256_hex(&format!("{EMPTY_SHA256}0")));
        assert!(!is_sha256_hex(&EMPTY_SHA256.replace('e', "x")));
    }
}
