//! Shared error types used across deltaglider crates.

use thiserror::Error;

/// Configuration errors, fatal at startup.
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        /// The variable name.
        name: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The cache directory cannot be created or written.
    #[error("Cache directory unusable: {path}: {message}")]
    CacheDirUnusable {
        /// The directory that failed.
        path: String,
        /// Underlying error message.
        message: String,
    },

    /// Store credentials are missing or incomplete.
    #[error("Missing credentials: {message}")]
    MissingCredentials {
        /// What is missing.
        message: String,
    },
}

impl ConfigError {
    /// Create an `InvalidValue` error for an environment variable.
    ///
    /// # Arguments
    /// * `name` - The environment variable name
    /// * `value` - The raw value that failed to parse
    /// * `reason` - Parse failure description
    pub fn invalid(name: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
