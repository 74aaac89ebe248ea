//! Environment-derived configuration.
//!
//! All knobs can be set through `DG_*` environment variables; explicit
//! setters override the environment for programmatic use.

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CACHE_MAX_BYTES, DEFAULT_CACHE_MEMORY_SIZE_MB, DEFAULT_MAX_RATIO,
};
use crate::error::ConfigError;

/// Which backend holds decoded reference blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    /// Disk-backed cache under a user cache directory (default).
    #[default]
    Filesystem,
    /// Bounded in-memory LRU.
    Memory,
}

/// All DeltaGlider configuration in one place.
#[derive(Debug, Clone)]
pub struct DeltaGliderConfig {
    /// Max delta/original ratio before falling back to direct storage.
    pub max_ratio: f64,
    /// Reference cache backend selection.
    pub cache_backend: CacheBackendKind,
    /// Directory for the filesystem cache backend.
    pub cache_dir: PathBuf,
    /// Byte quota for the filesystem cache backend.
    pub cache_max_bytes: u64,
    /// Size bound for the memory cache backend, in MiB.
    pub cache_memory_size_mb: u64,
    /// Optional key for at-rest cache encryption. Never persisted.
    pub cache_encryption_key: Option<String>,
    /// S3 endpoint override (MinIO, R2).
    pub endpoint_url: Option<String>,
    /// AWS region override.
    pub region: Option<String>,
}

impl Default for DeltaGliderConfig {
    fn default() -> Self {
        Self {
            max_ratio: DEFAULT_MAX_RATIO,
            cache_backend: CacheBackendKind::Filesystem,
            cache_dir: default_cache_dir(),
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            cache_memory_size_mb: DEFAULT_CACHE_MEMORY_SIZE_MB,
            cache_encryption_key: None,
            endpoint_url: None,
            region: None,
        }
    }
}

impl DeltaGliderConfig {
    /// Build a config from environment variables.
    ///
    /// Recognized variables: `DG_MAX_RATIO`, `DG_CACHE_BACKEND`,
    /// `DG_CACHE_DIR`, `DG_CACHE_MAX_BYTES`, `DG_CACHE_MEMORY_SIZE_MB`,
    /// `DG_CACHE_ENCRYPTION_KEY`, `AWS_ENDPOINT_URL`, `AWS_DEFAULT_REGION`.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` when a numeric or enum variable
    /// holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config: DeltaGliderConfig = Self::default();

        if let Ok(raw) = env::var("DG_MAX_RATIO") {
            let ratio: f64 = raw
                .parse()
                .map_err(|_| ConfigError::invalid("DG_MAX_RATIO", &raw, "expected a float"))?;
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::invalid(
                    "DG_MAX_RATIO",
                    &raw,
                    "expected a value in 0.0..=1.0",
                ));
            }
            config.max_ratio = ratio;
        }

        if let Ok(raw) = env::var("DG_CACHE_BACKEND") {
            config.cache_backend = match raw.as_str() {
                "filesystem" => CacheBackendKind::Filesystem,
                "memory" => CacheBackendKind::Memory,
                _ => {
                    return Err(ConfigError::invalid(
                        "DG_CACHE_BACKEND",
                        &raw,
                        "expected \"filesystem\" or \"memory\"",
                    ))
                }
            };
        }

        if let Ok(raw) = env::var("DG_CACHE_DIR") {
            config.cache_dir = PathBuf::from(raw);
        }

        if let Ok(raw) = env::var("DG_CACHE_MAX_BYTES") {
            config.cache_max_bytes = raw.parse().map_err(|_| {
                ConfigError::invalid("DG_CACHE_MAX_BYTES", &raw, "expected an integer byte count")
            })?;
        }

        if let Ok(raw) = env::var("DG_CACHE_MEMORY_SIZE_MB") {
            config.cache_memory_size_mb = raw.parse().map_err(|_| {
                ConfigError::invalid("DG_CACHE_MEMORY_SIZE_MB", &raw, "expected an integer")
            })?;
        }

        if let Ok(key) = env::var("DG_CACHE_ENCRYPTION_KEY") {
            if !key.is_empty() {
                config.cache_encryption_key = Some(key);
            }
        }

        if let Ok(url) = env::var("AWS_ENDPOINT_URL") {
            if !url.is_empty() {
                config.endpoint_url = Some(url);
            }
        }
        if let Ok(region) = env::var("AWS_DEFAULT_REGION") {
            if !region.is_empty() {
                config.region = Some(region);
            }
        }

        Ok(config)
    }

    /// Override the max delta/original ratio.
    pub fn with_max_ratio(mut self, max_ratio: f64) -> Self {
        self.max_ratio = max_ratio;
        self
    }

    /// Override the cache backend.
    pub fn with_cache_backend(mut self, backend: CacheBackendKind) -> Self {
        self.cache_backend = backend;
        self
    }

    /// Override the filesystem cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Override the S3 endpoint.
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }
}

/// Default location of the on-disk reference cache.
fn default_cache_dir() -> PathBuf {
    env::temp_dir().join(".deltaglider").join("reference_cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: DeltaGliderConfig = DeltaGliderConfig::default();
        assert_eq!(config.max_ratio, DEFAULT_MAX_RATIO);
        assert_eq!(config.cache_backend, CacheBackendKind::Filesystem);
        assert!(config.cache_encryption_key.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config: DeltaGliderConfig = DeltaGliderConfig::default()
            .with_max_ratio(0.8)
            .with_cache_backend(CacheBackendKind::Memory)
            .with_endpoint_url("http://localhost:9000");

        assert_eq!(config.max_ratio, 0.8);
        assert_eq!(config.cache_backend, CacheBackendKind::Memory);
        assert_eq!(
            config.endpoint_url.as_deref(),
            Some("http://localhost:9000")
        );
    }
}
