//! Shared types and utilities for DeltaGlider.
//!
//! This crate provides common functionality used across all deltaglider crates:
//! - SHA-256 computation over byte slices, files, and streams
//! - Environment-derived configuration
//! - Shared constants and error types

pub mod config;
pub mod constants;
pub mod error;
pub mod hash;

// Re-export commonly used items at crate root
pub use config::{CacheBackendKind, DeltaGliderConfig};
pub use constants::*;
pub use error::ConfigError;
pub use hash::{is_sha256_hex, sha256_bytes, verify_sha256, SHA256_HEX_LEN};
